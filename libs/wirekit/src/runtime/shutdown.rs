use tokio::signal;

/// Wait for a termination signal (Ctrl+C, SIGTERM) and return its name.
pub async fn wait_for_shutdown() -> anyhow::Result<&'static str> {
    let ctrl_c = async {
        signal::ctrl_c().await.map_err(|e| {
            tracing::error!(%e, "Failed to install Ctrl+C handler");
            e
        })?;
        Ok::<_, std::io::Error>("SIGINT")
    };

    #[cfg(unix)]
    let terminate = async {
        let mut handler = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
            tracing::error!(%e, "Failed to install SIGTERM handler");
            e
        })?;
        handler.recv().await;
        Ok::<_, std::io::Error>("SIGTERM")
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<&'static str, std::io::Error>>();

    let name = tokio::select! {
        result = ctrl_c => result?,
        result = terminate => result?,
    };

    tracing::info!(signal = name, "Shutdown signal received, initiating graceful shutdown");
    Ok(name)
}
