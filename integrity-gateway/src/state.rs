use crate::challenge::ChallengeStore;
use integrity_verifier::{Interpreter, TokenDecoder};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

#[derive(Clone)]
/// Shared state handed to every request handler.
pub struct AppState {
    pub challenges: Arc<ChallengeStore>,
    /// Relay to the decoding authority; a fake in tests.
    pub decoder: Arc<dyn TokenDecoder>,
    pub interpreter: Arc<Interpreter>,
    /// Running count of rate-limited upstream responses (quota awareness).
    pub rate_limited_seen: Arc<AtomicU64>,
    pub quota_warn_threshold: u64,
}
