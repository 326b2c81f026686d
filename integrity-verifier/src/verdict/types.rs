use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Envelope returned by the decoding authority's decode endpoint.
pub struct DecodeResponse {
    pub token_payload_external: Verdict,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Decoded, structured content of an attestation token.
///
/// Sections other than `request_details` are omitted by the authority when it
/// could not evaluate them, so they deserialize as `None`.
pub struct Verdict {
    pub request_details: RequestDetails,
    #[serde(default)]
    pub app_integrity: Option<AppIntegrity>,
    #[serde(default)]
    pub device_integrity: Option<DeviceIntegrity>,
    #[serde(default)]
    pub account_details: Option<AccountDetails>,
    #[serde(default)]
    pub environment_details: Option<EnvironmentDetails>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Request binding echoed back by the authority.
pub struct RequestDetails {
    /// Server-issued challenge the client bound into the token.
    pub request_hash: String,
    /// Application id the token was requested from, if reported.
    #[serde(default)]
    pub request_package_name: Option<String>,
    /// When the token was minted (milliseconds since Unix epoch).
    pub timestamp_millis: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppIntegrity {
    pub app_recognition_verdict: AppRecognitionVerdict,
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub certificate_sha256_digest: Option<Vec<String>>,
    #[serde(default)]
    pub version_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Whether the app matches a known, unmodified distribution.
pub enum AppRecognitionVerdict {
    Recognized,
    UnrecognizedVersion,
    #[serde(other)]
    Unevaluated,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIntegrity {
    /// Zero or more labels the device earned; absence of a label is failure.
    #[serde(default)]
    pub device_recognition_verdict: Vec<DeviceVerdictLabel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceVerdictLabel {
    MeetsBasicIntegrity,
    MeetsDeviceIntegrity,
    MeetsStrongIntegrity,
    MeetsVirtualIntegrity,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDetails {
    pub app_licensing_verdict: LicensingVerdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LicensingVerdict {
    Licensed,
    Unlicensed,
    #[serde(other)]
    Unevaluated,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Optional risk signals; informational only, not consulted by policy.
pub struct EnvironmentDetails {
    #[serde(default)]
    pub play_protect_verdict: Option<String>,
    #[serde(default)]
    pub app_access_risk_verdict: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Why a verification attempt was denied.
pub enum ReasonCode {
    RequestMismatch,
    AppIntegrityFailed,
    DeviceIntegrityFailed,
    AccountInvalid,
    StaleVerdict,
    TokenInvalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Final allow/deny outcome for one verification attempt.
///
/// This is the only thing a client ever sees; verdict internals stay
/// server-side.
pub struct Decision {
    pub outcome: Outcome,
    pub reason_codes: BTreeSet<ReasonCode>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            outcome: Outcome::Allow,
            reason_codes: BTreeSet::new(),
        }
    }

    /// A deny decision always cites at least one reason.
    pub fn deny<I: IntoIterator<Item = ReasonCode>>(reasons: I) -> Self {
        let reason_codes: BTreeSet<ReasonCode> = reasons.into_iter().collect();
        debug_assert!(!reason_codes.is_empty(), "deny without a reason code");
        Self {
            outcome: Outcome::Deny,
            reason_codes,
        }
    }

    pub fn is_allow(&self) -> bool {
        self.outcome == Outcome::Allow
    }
}
