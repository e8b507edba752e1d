pub mod ingest;
pub mod migrate;
pub mod view;

pub use ingest::handle_ingest;
pub use migrate::handle_migrate;
pub use view::handle_view;

use tracing::{error, info};

/// Wait for SIGTERM or SIGINT
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(err), _) | (_, Err(err)) => {
                error!("Failed to register signal handlers: {}", err);
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, exiting...");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT (Ctrl+C), exiting...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT (Ctrl+C), exiting..."),
            Err(err) => {
                error!("Failed to listen for SIGINT signal: {}", err);
                std::future::pending::<()>().await
            }
        }
    }
}
