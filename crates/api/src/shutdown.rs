use tokio::signal::unix::{signal, SignalKind};

/// Resolve once SIGTERM or SIGINT is received.
///
/// Intended for `axum::serve(..).with_graceful_shutdown(..)`. If a handler
/// cannot be installed, that signal is ignored and the other still applies.
pub async fn shutdown_signal() {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = terminate => tracing::info!("received SIGTERM, initiating graceful shutdown"),
        _ = interrupt => tracing::info!("received SIGINT, initiating graceful shutdown"),
    }
}
