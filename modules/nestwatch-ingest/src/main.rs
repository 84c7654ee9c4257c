use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nestwatch_common::Config;
use nestwatch_ingest::{HttpEnricher, ModerationQueue};
use nestwatch_store::PgStore;

/// One-shot maintenance pass: apply migrations, then sweep listings
/// past their expiry. Intended to run from the platform scheduler; the
/// serving processes wire the same services behind their own surfaces.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("nestwatch=info".parse()?))
        .init();

    info!("Nestwatch maintenance starting...");

    let config = Config::from_env();

    let store = Arc::new(PgStore::connect(&config.database_url).await?);
    store.run_migrations().await?;

    let enricher = Arc::new(HttpEnricher::new(&config)?);
    let queue = ModerationQueue::new(store, enricher);

    let swept = queue.expire_due().await?;
    info!(swept, "Maintenance pass complete");

    Ok(())
}
