use super::config::VerdictPolicy;
use super::types::{
    AppRecognitionVerdict, Decision, LicensingVerdict, Outcome, ReasonCode, Verdict,
};
use super::util::{constant_time_eq, now_millis};
use std::collections::BTreeSet;

/// Evaluates decoded verdicts against a fixed policy.
///
/// `evaluate` is deterministic apart from the optional freshness check, which
/// reads the clock; given the same verdict, challenge, and clock it always
/// produces the same decision.
pub struct Interpreter {
    policy: VerdictPolicy,
}

impl Interpreter {
    pub fn new(policy: VerdictPolicy) -> Self {
        Self { policy }
    }

    /// Applies the pass/fail policy to a decoded verdict.
    ///
    /// The request-binding check runs first and short-circuits: a token minted
    /// for a different challenge denies regardless of any other field. The
    /// remaining checks accumulate, so a verdict failing several of them
    /// reports every applicable reason code.
    pub fn evaluate(&self, verdict: &Verdict, expected_challenge: &str) -> Decision {
        let binding = &verdict.request_details.request_hash;
        if !constant_time_eq(binding.as_bytes(), expected_challenge.as_bytes()) {
            return Decision::deny([ReasonCode::RequestMismatch]);
        }

        let mut reasons = BTreeSet::new();

        if let Some(window) = self.policy.freshness {
            let drift = now_millis().abs_diff(verdict.request_details.timestamp_millis);
            if drift > window.as_millis() as u64 {
                reasons.insert(ReasonCode::StaleVerdict);
            }
        }

        if let Some(expected) = &self.policy.expected_package_name {
            let reported = verdict.request_details.request_package_name.as_deref();
            if reported != Some(expected.as_str()) {
                reasons.insert(ReasonCode::AppIntegrityFailed);
            }
        }

        if self.policy.require_app_integrity {
            let recognized = matches!(
                verdict
                    .app_integrity
                    .as_ref()
                    .map(|app| app.app_recognition_verdict),
                Some(AppRecognitionVerdict::Recognized)
            );
            if !recognized {
                reasons.insert(ReasonCode::AppIntegrityFailed);
            }
        }

        if self.policy.require_device_integrity {
            let meets = verdict.device_integrity.as_ref().is_some_and(|device| {
                device
                    .device_recognition_verdict
                    .contains(&self.policy.required_device_label)
            });
            if !meets {
                reasons.insert(ReasonCode::DeviceIntegrityFailed);
            }
        }

        if self.policy.require_account_licensed {
            let licensed = matches!(
                verdict
                    .account_details
                    .as_ref()
                    .map(|account| account.app_licensing_verdict),
                Some(LicensingVerdict::Licensed)
            );
            if !licensed {
                reasons.insert(ReasonCode::AccountInvalid);
            }
        }

        if reasons.is_empty() {
            Decision::allow()
        } else {
            Decision {
                outcome: Outcome::Deny,
                reason_codes: reasons,
            }
        }
    }
}
