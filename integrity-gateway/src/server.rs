use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Serves the gateway router over TCP until the shutdown token fires.
pub async fn serve_http(listener: TcpListener, app: Router, shutdown: CancellationToken) {
    info!("gateway HTTP server listening");

    let graceful = async move { shutdown.cancelled().await };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(graceful)
        .await
    {
        warn!(error = ?e, "http server error");
    }

    info!("HTTP listener loop exited");
}
