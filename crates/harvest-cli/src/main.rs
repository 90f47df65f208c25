//! harvest - resumable harvesting of paginated search results.
//!
//! Walks a search API page by page, pacing itself against throttling, and
//! checkpoints progress so interrupted or budget-limited jobs pick up where
//! they stopped.

mod cli;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let default_filter = if cli::is_verbose() {
        "harvest=info,harvest_fetch=info"
    } else {
        "harvest=warn,harvest_fetch=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    cli::run().await
}
