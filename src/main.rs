use secureflow::config::Config;
use secureflow::jobs::JobScanner;
use secureflow::notify::{NotificationCenter, Toast};
use secureflow::onchain::SecureFlowClient;
use secureflow::store;
use secureflow::streams::StreamClient;
use secureflow::watcher::AccountWatcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage.
    // The websocket transport needs this to establish TLS connections.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::discover()?;
    config.logging.init();

    info!("secureflow v{} starting", env!("CARGO_PKG_VERSION"));

    let account = config.account_address()?;
    let escrow_address = config.escrow_address()?;
    let streams_address = config.streams_address()?;

    let client = Arc::new(SecureFlowClient::connect_http(&config.chain.rpc_url, escrow_address)?);
    let source = Arc::new(StreamClient::connect(&config.chain.ws_url, streams_address).await?);
    let notifications = store::open(&config).await?;
    info!(backend = ?config.notifications.backend, "notification store open");

    let (toast_tx, mut toast_rx) = mpsc::unbounded_channel::<Toast>();
    let center = NotificationCenter::new(notifications, config.notifications.max_per_account)
        .with_toasts(toast_tx.clone());
    let scanner = JobScanner::new(client, config.scanner.page_size);

    tokio::spawn(async move {
        while let Some(toast) = toast_rx.recv().await {
            info!(title = %toast.title, destructive = toast.destructive, "{}", toast.description);
        }
    });

    let watcher = AccountWatcher::new(
        account,
        scanner,
        source,
        center,
        config.notifications.dedup_capacity,
    )
    .with_toasts(toast_tx);

    info!(account = %account, escrow = %escrow_address, "watching account");
    watcher
        .run(Duration::from_secs(config.scanner.refresh_interval_secs.max(1)))
        .await?;

    info!("secureflow stopped");
    Ok(())
}
