use anyhow::Result;

mod challenge;
mod config;
mod handlers;
mod logging;
mod router;
mod runner;
mod server;
mod state;

use runner::Runner;

/// Parses configuration, initialises logging, and runs the gateway HTTP server.
#[tokio::main]
async fn main() -> Result<()> {
    let cfg = config::Config::from_env()?;
    logging::setup_logging(&cfg);
    cfg.info();

    let runner = Runner::builder(cfg)
        .bind_public()
        .await?
        .build_state()?
        .build()?;

    runner.run().await
}
