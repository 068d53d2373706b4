use tokio_util::sync::CancellationToken;

/// Token cancelled on Ctrl-C, or SIGTERM on unix. The dashboard server drains
/// in-flight requests once it fires.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => tracing::info!("Received Ctrl-C, shutting down"),
                Err(e) => tracing::warn!(error = %e, "Could not listen for Ctrl-C, shutting down"),
            },
            _ = terminate() => tracing::info!("Received SIGTERM, shutting down"),
        }
        trigger.cancel();
    });

    token
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
