use crate::exit_codes::EXIT_ERROR;
use repodoc::ToolGateway;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

/// Exit status used after an interrupt, as shells report for SIGINT
pub const EXIT_INTERRUPTED: i32 = 130;

/// Wait for Ctrl+C (or SIGTERM on unix) in the background, stop every pooled
/// tool-server connection, then exit.
pub fn release_on_signal(gateway: Arc<ToolGateway>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let code = tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C signal, releasing connections...");
                EXIT_INTERRUPTED
            },
            _ = terminate => {
                info!("Received terminate signal, releasing connections...");
                EXIT_ERROR
            },
        };

        let stopped = gateway.shutdown().await;
        info!("Released {} connection(s)", stopped);
        std::process::exit(code);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use repodoc::GatewayConfig;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_handler_does_not_block() {
        let gateway = Arc::new(ToolGateway::with_backend(GatewayConfig::default(), None));

        let start = std::time::Instant::now();
        release_on_signal(Arc::clone(&gateway));
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_ctrl_c_signal_setup() {
        let result = timeout(Duration::from_millis(10), signal::ctrl_c()).await;
        assert!(result.is_err(), "Should timeout when no Ctrl+C is sent");
    }
}
