use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// 256 bits of entropy per challenge.
const CHALLENGE_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("secure random source unavailable: {0}")]
    EntropySourceUnavailable(String),
    #[error("no live challenge for session")]
    NoSuchChallenge,
}

#[derive(Debug, Clone)]
/// Single-use challenge the client must bind into its attestation token.
pub struct IssuedChallenge {
    pub value: String,
    pub issued_at: Instant,
}

/// In-memory store of per-session challenges with TTL eviction.
///
/// Entries are tiny and short-lived; TTL expiry (lazy on read plus a periodic
/// sweep) bounds memory. One challenge per session: re-issuing replaces any
/// prior unconsumed one, and consumption removes the entry in the same locked
/// step so two concurrent verifications cannot both observe it.
pub struct ChallengeStore {
    entries: Mutex<HashMap<String, IssuedChallenge>>,
    ttl: Duration,
}

impl ChallengeStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Issues a fresh challenge for `session_id`, replacing any prior one.
    pub fn issue(&self, session_id: &str) -> Result<String, ChallengeError> {
        let mut buf = [0u8; CHALLENGE_BYTES];
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| ChallengeError::EntropySourceUnavailable(e.to_string()))?;
        let value = b64.encode(buf);

        let challenge = IssuedChallenge {
            value: value.clone(),
            issued_at: Instant::now(),
        };
        self.entries
            .lock()
            .expect("challenge store lock")
            .insert(session_id.to_owned(), challenge);
        Ok(value)
    }

    /// Removes and returns the live challenge for `session_id` in one step.
    ///
    /// Missing, already-consumed, and expired challenges are indistinguishable
    /// to the caller: the client restarts the flow either way.
    pub fn take(&self, session_id: &str) -> Result<IssuedChallenge, ChallengeError> {
        let mut entries = self.entries.lock().expect("challenge store lock");
        match entries.remove(session_id) {
            Some(challenge) if challenge.issued_at.elapsed() <= self.ttl => Ok(challenge),
            _ => Err(ChallengeError::NoSuchChallenge),
        }
    }

    /// Drops expired entries; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().expect("challenge store lock");
        let before = entries.len();
        entries.retain(|_, challenge| challenge.issued_at.elapsed() <= self.ttl);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_challenge_can_be_taken_exactly_once() {
        let store = ChallengeStore::new(Duration::from_secs(300));
        let value = store.issue("abc").expect("issue challenge");
        assert!(!value.is_empty());

        let taken = store.take("abc").expect("first take succeeds");
        assert_eq!(taken.value, value);

        let err = store.take("abc").expect_err("second take must fail");
        assert!(matches!(err, ChallengeError::NoSuchChallenge));
    }

    #[test]
    fn reissue_invalidates_the_previous_challenge() {
        let store = ChallengeStore::new(Duration::from_secs(300));
        let first = store.issue("abc").expect("first issue");
        let second = store.issue("abc").expect("second issue");
        assert_ne!(first, second);

        let taken = store.take("abc").expect("take succeeds");
        assert_eq!(taken.value, second);
        assert!(store.take("abc").is_err());
    }

    #[test]
    fn sessions_are_independent() {
        let store = ChallengeStore::new(Duration::from_secs(300));
        let a = store.issue("a").expect("issue a");
        let b = store.issue("b").expect("issue b");

        assert_eq!(store.take("b").expect("take b").value, b);
        assert_eq!(store.take("a").expect("take a").value, a);
    }

    #[test]
    fn expired_challenge_is_rejected_on_take() {
        let store = ChallengeStore::new(Duration::from_millis(1));
        store.issue("abc").expect("issue challenge");
        std::thread::sleep(Duration::from_millis(10));

        let err = store.take("abc").expect_err("expired take must fail");
        assert!(matches!(err, ChallengeError::NoSuchChallenge));
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let store = ChallengeStore::new(Duration::from_millis(1));
        store.issue("old").expect("issue old");
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(store.sweep(), 1);
        assert_eq!(store.sweep(), 0);
    }

    #[test]
    fn challenge_values_are_distinct_and_high_entropy() {
        let store = ChallengeStore::new(Duration::from_secs(300));
        let a = store.issue("a").expect("issue");
        let b = store.issue("b").expect("issue");
        assert_ne!(a, b);
        // 32 bytes of entropy, base64-encoded.
        assert_eq!(b64.decode(&a).expect("valid base64").len(), CHALLENGE_BYTES);
    }
}
