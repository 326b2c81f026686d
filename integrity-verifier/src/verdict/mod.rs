pub mod client;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod policy;
pub mod types;

mod util;

pub use client::{RelayClient, RelayConfig, TokenDecoder};
pub use config::VerdictPolicy;
pub use errors::RelayError;
pub use policy::Interpreter;
pub use types::{Decision, Outcome, ReasonCode, Verdict};
