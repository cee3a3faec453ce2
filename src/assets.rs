use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Serves the calculator's static files for the local browser.
///
/// Runs as a background task until [`AssetServer::shutdown`] is awaited.
pub struct AssetServer {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl AssetServer {
    pub async fn start(root: &Path, addr: SocketAddr) -> Result<Self> {
        let app = Router::new().fallback_service(ServeDir::new(root));

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding asset server to {addr}"))?;
        let addr = listener.local_addr()?;
        tracing::info!("Serving {} at port {}", root.display(), addr.port());

        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = stopped.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!("Asset server error: {}", e);
            }
        });

        Ok(Self { addr, stop, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for in-flight ones, up to a bound.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        let mut task = self.task;
        match tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await {
            Ok(Ok(())) => tracing::debug!("Asset server stopped"),
            Ok(Err(e)) => tracing::warn!("Asset server task ended abnormally: {}", e),
            Err(_) => {
                tracing::warn!("Asset server still draining after {:?}; aborting", DRAIN_TIMEOUT);
                task.abort();
            }
        }
    }
}
