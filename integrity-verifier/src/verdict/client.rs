use super::credentials::CachedCredentials;
use super::errors::RelayError;
use super::types::{DecodeResponse, Verdict};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[async_trait]
/// Capability that turns an opaque attestation token into a decoded verdict.
///
/// The production implementation is `RelayClient`; tests substitute a fake so
/// no network or credentials are needed.
pub trait TokenDecoder: Send + Sync {
    async fn decode_token(&self, token: &str) -> Result<Verdict, RelayError>;
}

#[derive(Debug, Clone)]
/// Outbound call parameters for the decoding authority.
pub struct RelayConfig {
    /// Decode endpoint URL.
    pub decode_url: String,
    /// Per-request timeout, distinct from the retry backoff window.
    pub request_timeout: Duration,
    /// Total attempts for transient failures (first try included).
    pub max_attempts: u32,
    /// Backoff before the first retry; doubles per subsequent retry.
    pub backoff_base: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            decode_url: String::new(),
            request_timeout: Duration::from_secs(5),
            max_attempts: 3,
            backoff_base: Duration::from_millis(250),
        }
    }
}

/// HTTP client for the decoding authority's decode endpoint.
///
/// Forwards the token as-is with a bearer credential attached. Verdicts are
/// never cached: they are single-use security signals.
pub struct RelayClient {
    http: reqwest::Client,
    cfg: RelayConfig,
    credentials: CachedCredentials,
}

impl RelayClient {
    pub fn new(cfg: RelayConfig, credentials: CachedCredentials) -> Result<Self, RelayError> {
        if cfg.decode_url.is_empty() {
            return Err(RelayError::Internal("decode_url not configured".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| RelayError::Internal(format!("build http client: {e}")))?;
        Ok(Self {
            http,
            cfg,
            credentials,
        })
    }

    async fn attempt_decode(&self, token: &str) -> Result<Verdict, RelayError> {
        let bearer = self.credentials.bearer_token().await?;

        let response = self
            .http
            .post(&self.cfg.decode_url)
            .bearer_auth(bearer)
            .json(&json!({ "integrityToken": token }))
            .send()
            .await
            .map_err(|e| RelayError::UpstreamUnavailable(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: DecodeResponse = response
                .json()
                .await
                .map_err(|e| RelayError::Decode(e.without_url().to_string()))?;
            return Ok(body.token_payload_external);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RelayError::RateLimited {
                retry_after: parse_retry_after(response.headers()),
            });
        }
        if status.is_server_error() {
            return Err(RelayError::UpstreamUnavailable(format!("status {status}")));
        }
        Err(RelayError::UpstreamRejected {
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl TokenDecoder for RelayClient {
    async fn decode_token(&self, token: &str) -> Result<Verdict, RelayError> {
        if token.is_empty() {
            return Err(RelayError::Decode("empty token".into()));
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.attempt_decode(token).await {
                Ok(verdict) => {
                    debug!(attempt, "token decoded");
                    return Ok(verdict);
                }
                Err(RelayError::UpstreamUnavailable(reason))
                    if attempt < self.cfg.max_attempts =>
                {
                    let delay = backoff_delay(self.cfg.backoff_base, attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %reason,
                        "decode attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Exponential backoff: base, 2*base, 4*base, ... for attempts 1, 2, 3, ...
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Reads a `Retry-After` delay expressed in seconds, if present and sane.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_millis(250);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(250));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(1000));
    }

    #[test]
    fn retry_after_seconds_header_is_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(
            parse_retry_after(&headers),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn missing_or_http_date_retry_after_yields_none() {
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }
}
