//! Print the event-stream schema ids and, with a signer, register them.
//!
//! Usage:
//!   cargo run --bin register-schemas              # register when a key is set
//!   cargo run --bin register-schemas -- --dry-run # only print ids

use secureflow::config::Config;
use secureflow::streams::{SchemaKind, StreamEventId, StreamPublisher};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let _ = dotenvy::dotenv();

    let config = Config::discover()?;
    config.logging.init();

    let args: Vec<String> = std::env::args().collect();
    let dry_run = args.iter().any(|a| a == "--dry-run");

    println!("Schemas\n");
    for kind in SchemaKind::ALL {
        println!("  {:<28} {}", kind.name(), kind.id());
        println!("    {}", kind.schema());
    }

    println!("\nEvents\n");
    for event in StreamEventId::ALL {
        println!("  {:<22} {:<28} {}", event.as_str(), event.schema().name(), event.topic());
    }

    if dry_run {
        return Ok(());
    }
    if !config.has_signer() {
        println!("\nSet PRIVATE_KEY to register these schemas");
        return Ok(());
    }

    let streams_address = config.streams_address()?;
    let publisher = StreamPublisher::connect(&config.chain.rpc_url, streams_address, &config.account.private_key)?;
    info!(streams = %streams_address, count = SchemaKind::ALL.len(), "registering schemas");
    let tx_hash = publisher.register_schemas().await?;
    println!("\nRegistered {} schemas (tx {tx_hash})", SchemaKind::ALL.len());

    Ok(())
}
