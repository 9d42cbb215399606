//! matukana-admin binary
//!
//! Reads commands from stdin, one per line, and answers each with a JSON line
//! on stdout. Logs go to stderr.

use std::sync::Arc;

use matukana_admin::{load_seed, AdminConfig, Command, Dashboard, Response, USAGE};
use matukana_sync::MemoryStore;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AdminConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Matukana admin");

    let store = MemoryStore::new().with_latency(config.store_latency);
    if let Some(path) = &config.seed {
        for (collection, records) in load_seed(path)? {
            tracing::info!("Seeding {} with {} records", collection, records.len());
            store.seed(collection, records);
        }
    }

    let dashboard = Dashboard::open(Arc::new(store), &config.collections).await?;
    eprintln!("{USAGE}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => dashboard.execute(command).await,
            Err(e) => Response::error(e),
        };
        let response_json = serde_json::to_string(&response)? + "\n";
        stdout.write_all(response_json.as_bytes()).await?;
        stdout.flush().await?;
    }

    dashboard.close();
    tracing::info!("Admin session closed");
    Ok(())
}
