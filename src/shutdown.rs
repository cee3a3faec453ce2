use std::future::Future;

/// Resolves on Ctrl-C, or SIGTERM on Unix (what the supervisor sends workers).
///
/// The handlers are installed when this is called, not when the future is first
/// polled, so a signal that arrives while the caller is still busy (launching a
/// browser, say) is held until the future is awaited. Must be called from
/// inside a tokio runtime.
#[cfg(unix)]
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    fn listen(kind: SignalKind, name: &str) -> Option<Signal> {
        signal(kind)
            .inspect_err(|e| tracing::warn!("Failed to install {} handler: {}", name, e))
            .ok()
    }

    async fn recv(listener: Option<Signal>) {
        match listener {
            Some(mut listener) => {
                listener.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    let interrupt = listen(SignalKind::interrupt(), "Ctrl-C");
    let terminate = listen(SignalKind::terminate(), "SIGTERM");

    async move {
        tokio::select! {
            _ = recv(interrupt) => {},
            _ = recv(terminate) => {},
        }
    }
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
