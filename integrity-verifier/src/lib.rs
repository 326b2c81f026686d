//! Backend side of mobile attestation verification: relays opaque tokens to
//! the decoding authority and evaluates the returned verdict against policy.
//!
//! The decoding authority and the mobile SDK that mints tokens are opaque
//! external collaborators. This crate never parses a token locally; it only
//! forwards it (`RelayClient`) and interprets the decoded verdict
//! (`Interpreter`).

pub mod verdict;

pub use verdict::client::{RelayClient, RelayConfig, TokenDecoder};
pub use verdict::config::VerdictPolicy;
pub use verdict::credentials::{
    CachedCredentials, CredentialSource, ServiceCredential, StaticToken,
};
pub use verdict::errors::RelayError;
pub use verdict::policy::Interpreter;
pub use verdict::types::{Decision, Outcome, ReasonCode, Verdict};
