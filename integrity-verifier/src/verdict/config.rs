use super::types::DeviceVerdictLabel;
use std::time::Duration;

#[derive(Debug, Clone)]
/// Which verdict checks are mandatory for a given call site.
///
/// The request-binding check is always performed; everything else is policy.
/// Different call sites legitimately want different strictness (a login flow
/// may skip licensing, a purchase flow may not), so embedders construct one
/// policy per call site instead of sharing a hardcoded one.
pub struct VerdictPolicy {
    /// Require the app to match a recognized, unmodified distribution.
    pub require_app_integrity: bool,
    /// Require the device label below to be present in the verdict.
    pub require_device_integrity: bool,
    /// Label the device must have earned when device integrity is required.
    pub required_device_label: DeviceVerdictLabel,
    /// Require the account's licensing verdict to be LICENSED.
    pub require_account_licensed: bool,
    /// Expected application id; mismatch is treated as an app-integrity failure.
    pub expected_package_name: Option<String>,
    /// Maximum age of the verdict's mint timestamp. `None` disables the check.
    pub freshness: Option<Duration>,
}

impl Default for VerdictPolicy {
    fn default() -> Self {
        Self {
            require_app_integrity: true,
            require_device_integrity: true,
            required_device_label: DeviceVerdictLabel::MeetsDeviceIntegrity,
            require_account_licensed: false,
            expected_package_name: None,
            freshness: Some(Duration::from_secs(300)),
        }
    }
}
