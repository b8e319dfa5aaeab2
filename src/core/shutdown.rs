use tokio::signal;
use tokio::sync::watch;

/// Resolves on Ctrl+C or SIGTERM. A handler that fails to install never fires.
pub(crate) async fn shutdown_signal() {
    let interrupt = async {
        match signal::ctrl_c().await {
            Ok(()) => "interrupt",
            Err(err) => {
                tracing::error!(error = %err, "Failed to install Ctrl+C handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "terminate"
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    let received = tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    };

    tracing::info!(signal = received, "Shutdown signal received");
}

/// Watch channel flipped to `true` once `shutdown_signal` resolves.
pub(crate) fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        if tx.send(true).is_err() {
            tracing::warn!("No background tasks left to notify about shutdown");
        }
    });
    rx
}
