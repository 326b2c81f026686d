use super::errors::RelayError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
/// Short-lived service identity presented to the decoding authority.
pub struct ServiceCredential {
    pub token: String,
    /// When the credential stops being valid. `None` means it does not expire
    /// on its own (e.g. a statically mounted token).
    pub expires_at: Option<SystemTime>,
}

#[async_trait]
/// Where service credentials come from. Implementations talk to whatever
/// identity provider the deployment uses; tests substitute a fake.
pub trait CredentialSource: Send + Sync {
    async fn fetch(&self) -> Result<ServiceCredential, RelayError>;
}

/// Read-through cache over a `CredentialSource`: fetch, hold until expiry,
/// refresh. Keeps credential lifecycle out of the request path's hot loop and
/// out of ambient global state.
pub struct CachedCredentials {
    source: Arc<dyn CredentialSource>,
    cached: RwLock<Option<ServiceCredential>>,
    /// Refresh this long before the credential actually expires.
    refresh_margin: Duration,
}

impl CachedCredentials {
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
            refresh_margin: Duration::from_secs(30),
        }
    }

    /// Returns a bearer token, refreshing from the source if the cached one
    /// is missing or inside the refresh margin.
    pub async fn bearer_token(&self) -> Result<String, RelayError> {
        if let Some(cred) = self.cached.read().await.as_ref() {
            if self.is_fresh(cred) {
                return Ok(cred.token.clone());
            }
        }

        let mut guard = self.cached.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(cred) = guard.as_ref() {
            if self.is_fresh(cred) {
                return Ok(cred.token.clone());
            }
        }

        debug!("refreshing service credential");
        let cred = self.source.fetch().await?;
        let token = cred.token.clone();
        *guard = Some(cred);
        Ok(token)
    }

    fn is_fresh(&self, cred: &ServiceCredential) -> bool {
        match cred.expires_at {
            None => true,
            Some(expires_at) => match expires_at.duration_since(SystemTime::now()) {
                Ok(remaining) => remaining > self.refresh_margin,
                Err(_) => false,
            },
        }
    }
}

/// Credential mounted via configuration. Stands in for a real identity
/// provider in deployments that inject a pre-scoped token.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for StaticToken {
    async fn fetch(&self) -> Result<ServiceCredential, RelayError> {
        if self.token.is_empty() {
            return Err(RelayError::Credential("empty service token".into()));
        }
        Ok(ServiceCredential {
            token: self.token.clone(),
            expires_at: None,
        })
    }
}
