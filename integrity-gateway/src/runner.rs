use anyhow::{anyhow, Context, Result};
use integrity_verifier::{CachedCredentials, Interpreter, RelayClient, StaticToken};
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::challenge::ChallengeStore;
use crate::config::Config;
use crate::handlers::shutdown_signal;
use crate::router::build_public_router;
use crate::server::serve_http;
use crate::state::AppState;

const CHALLENGE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Top-level orchestrator for the gateway HTTP server.
pub struct Runner {
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
}

impl Runner {
    pub fn builder(cfg: Config) -> RunnerBuilder {
        RunnerBuilder::from(cfg)
    }

    /// Bind a TCP listener on the configured address, annotating errors with context.
    async fn bind(addr: SocketAddr) -> Result<TcpListener> {
        tracing::info!(%addr, "binding public listener");
        TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind public addr {addr}"))
    }

    /// Runs the gateway until a shutdown signal is received.
    pub async fn run(self) -> Result<()> {
        tracing::debug!("starting runner");

        let Runner {
            listener,
            state,
            shutdown,
        } = self;

        let sweep_handle = spawn_challenge_sweep(state.challenges.clone(), shutdown.clone());

        let app = build_public_router(state);
        let server_handle = tokio::spawn(serve_http(listener, app, shutdown.clone()));

        shutdown_signal().await;
        info!("shutdown signal received, exiting");
        shutdown.cancel();

        if let Err(e) = sweep_handle.await {
            error!(error = ?e, "challenge sweep task panicked");
        }
        if let Err(e) = server_handle.await {
            error!(error = ?e, "http server task panicked");
        }

        Ok(())
    }
}

pub struct RunnerBuilder {
    cfg: Config,
    listener: Option<TcpListener>,
    state: Option<AppState>,
    shutdown: CancellationToken,
}

impl RunnerBuilder {
    pub fn from(cfg: Config) -> Self {
        Self {
            cfg,
            listener: None,
            state: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn bind_public(mut self) -> Result<Self> {
        let listener = Runner::bind(self.cfg.listen_addr).await?;
        self.listener = Some(listener);
        Ok(self)
    }

    /// Wires the challenge store, relay client, and interpreter together.
    pub fn build_state(mut self) -> Result<Self> {
        let credentials = CachedCredentials::new(Arc::new(StaticToken::new(
            self.cfg.service_token.clone(),
        )));
        let relay =
            RelayClient::new(self.cfg.relay_config(), credentials).context("build relay client")?;

        let state = AppState {
            challenges: Arc::new(ChallengeStore::new(self.cfg.challenge_ttl())),
            decoder: Arc::new(relay),
            interpreter: Arc::new(Interpreter::new(self.cfg.verdict_policy())),
            rate_limited_seen: Arc::new(AtomicU64::new(0)),
            quota_warn_threshold: self.cfg.quota_warn_threshold,
        };
        self.state = Some(state);
        Ok(self)
    }

    pub fn build(self) -> Result<Runner> {
        let listener = self
            .listener
            .ok_or_else(|| anyhow!("public listener not bound"))?;
        let state = self.state.ok_or_else(|| anyhow!("state not built"))?;

        Ok(Runner {
            listener,
            state,
            shutdown: self.shutdown,
        })
    }
}

/// Periodically evicts expired challenges so the store stays bounded.
fn spawn_challenge_sweep(
    store: Arc<ChallengeStore>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(CHALLENGE_SWEEP_INTERVAL) => {
                    let dropped = store.sweep();
                    if dropped > 0 {
                        debug!(dropped, "expired challenges swept");
                    }
                }
            }
        }
    })
}
