use integrity_verifier::{RelayConfig, VerdictPolicy};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
/// Runtime configuration loaded from `GATEWAY_*` environment variables.
pub struct Config {
    pub log_level: Option<String>,

    #[serde(default = "def_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Decode endpoint of the attestation decoding authority.
    pub decode_url: String,

    /// Service credential presented upstream as a bearer token.
    pub service_token: String,

    /// How long an issued challenge stays honorable.
    #[serde(default = "def_challenge_ttl_secs")]
    pub challenge_ttl_secs: u64,

    /// Per-request timeout for the upstream decode call.
    #[serde(default = "def_decode_timeout_secs")]
    pub decode_timeout_secs: u64,

    /// Total decode attempts for transient upstream failures.
    #[serde(default = "def_decode_max_attempts")]
    pub decode_max_attempts: u32,

    /// Warn operators once this many rate-limited responses have been seen;
    /// the upstream decode quota is finite and externally imposed.
    #[serde(default = "def_quota_warn_threshold")]
    pub quota_warn_threshold: u64,

    #[serde(default = "def_true")]
    pub require_app_integrity: bool,
    #[serde(default = "def_true")]
    pub require_device_integrity: bool,
    #[serde(default)]
    pub require_account_licensed: bool,
    pub expected_package_name: Option<String>,
    /// Maximum verdict age in seconds; 0 disables the freshness check.
    #[serde(default = "def_verdict_freshness_secs")]
    pub verdict_freshness_secs: u64,
}

impl Config {
    /// Populates the configuration from environment variables, honoring `.env`.
    pub fn from_env() -> anyhow::Result<Self> {
        tracing::debug!("fetching config");
        let _ = dotenvy::dotenv();
        let cfg: Self = envy::prefixed("GATEWAY_").from_env()?;
        Ok(cfg)
    }

    /// Emit the effective configuration via tracing. Never logs the credential.
    pub fn info(&self) {
        tracing::info!(
            listen_addr = %self.listen_addr,
            decode_url = %self.decode_url,
            challenge_ttl_secs = self.challenge_ttl_secs,
            decode_max_attempts = self.decode_max_attempts,
            "effective config"
        );
        if self.listen_addr.ip().is_unspecified() {
            tracing::warn!("binding to 0.0.0.0 — make sure this is intentional");
        }
    }

    pub fn verdict_policy(&self) -> VerdictPolicy {
        VerdictPolicy {
            require_app_integrity: self.require_app_integrity,
            require_device_integrity: self.require_device_integrity,
            require_account_licensed: self.require_account_licensed,
            expected_package_name: self.expected_package_name.clone(),
            freshness: match self.verdict_freshness_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            ..VerdictPolicy::default()
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            decode_url: self.decode_url.clone(),
            request_timeout: Duration::from_secs(self.decode_timeout_secs),
            max_attempts: self.decode_max_attempts,
            ..RelayConfig::default()
        }
    }

    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_secs(self.challenge_ttl_secs)
    }
}

fn def_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

fn def_challenge_ttl_secs() -> u64 {
    300
}

fn def_decode_timeout_secs() -> u64 {
    5
}

fn def_decode_max_attempts() -> u32 {
    3
}

fn def_quota_warn_threshold() -> u64 {
    100
}

fn def_verdict_freshness_secs() -> u64 {
    300
}

fn def_true() -> bool {
    true
}
