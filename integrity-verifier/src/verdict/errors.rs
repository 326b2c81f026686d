use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
/// High-level error taxonomy consumers can match on when the relay fails.
pub enum RelayError {
    /// Network failure, timeout, or 5xx from the decoding authority. Retried
    /// with backoff before being surfaced.
    #[error("decoding authority unreachable: {0}")]
    UpstreamUnavailable(String),
    /// 4xx from the decoding authority: the token itself is malformed,
    /// expired, or invalid. Not retryable.
    #[error("decoding authority rejected the token (status {status})")]
    UpstreamRejected { status: u16 },
    /// 429 from the decoding authority. The daily decode quota is finite and
    /// externally imposed; `retry_after` carries the server-indicated window.
    #[error("decoding authority rate limited the request")]
    RateLimited { retry_after: Option<Duration> },
    /// The injected credential provider could not produce a service identity.
    #[error("service credential unavailable: {0}")]
    Credential(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("internal: {0}")]
    Internal(String),
}
