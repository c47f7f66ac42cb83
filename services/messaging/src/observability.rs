//! Process-level plumbing shared by the binaries: log setup and the
//! shutdown signal.

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// fmt subscriber filtered by `RUST_LOG`, `info` when unset.
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Ctrl+C received, shutting down"),
                    _ = term.recv() => info!("SIGTERM received, shutting down"),
                }
                return;
            }
            Err(e) => tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C only"),
        }
    }

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Ctrl+C received, shutting down");
    }
}

/// Token cancelled by the first shutdown signal.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.cancel();
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_not_cancelled_without_signal() {
        let token = shutdown_token();
        tokio::task::yield_now().await;
        assert!(!token.is_cancelled());
    }
}
