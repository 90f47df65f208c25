//! Run command: harvest one job per query.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use futures::future::join_all;
use tokio::sync::mpsc;

use harvest::{
    Config, JobResult, JobSpec, JobStatus, PageArchiver, PaginationManager, RecordIdentity,
    Settings, Storage,
};
use harvest_fetch::HttpSearchClient;

use super::helpers::{format_duration, format_number, open_storage, status_label};
use crate::cli::progress::{discard, JobProgress};

/// Event buffer shared by all jobs of one invocation.
const EVENT_BUFFER: usize = 1024;

pub struct RunOptions {
    pub category: String,
    pub queries: Vec<String>,
    pub max_pages: Option<u32>,
    pub start_page: Option<u32>,
    pub budget: Option<u64>,
    pub retry_failed: bool,
    pub archive: bool,
    pub quiet: bool,
}

pub async fn cmd_run(settings: &Settings, config: &Config, options: RunOptions) -> anyhow::Result<()> {
    if config.search.endpoint.is_empty() {
        anyhow::bail!("No search endpoint configured; set [search] endpoint in harvest.toml");
    }

    let storage: Arc<dyn Storage> = open_storage(settings)?;
    let client = HttpSearchClient::builder(config.search.clone(), config.engine.fetch_timeout())
        .identity(RecordIdentity::from_config(&config.identity))
        .build()
        .map_err(anyhow::Error::msg)?;

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let display = if options.quiet {
        tokio::spawn(discard(rx))
    } else {
        tokio::spawn(JobProgress::new().drive(rx))
    };

    let budget = options.budget.map(Duration::from_secs);
    let mut jobs = Vec::with_capacity(options.queries.len());
    for query in &options.queries {
        let mut spec = JobSpec::new(options.category.clone(), query.clone());
        if let Some(max_pages) = options.max_pages {
            spec = spec.with_max_pages(max_pages);
        }
        if let Some(start_page) = options.start_page {
            spec = spec.with_start_page(start_page);
        }
        if options.retry_failed {
            spec = spec.with_retry_failed();
        }

        let session = Arc::new(client.session(spec.key.clone()));
        let mut builder = PaginationManager::builder(session.clone(), session, storage.clone())
            .config(config.engine.clone())
            .events(tx.clone());
        if options.archive {
            builder = builder.handler(Arc::new(PageArchiver::new(storage.clone())));
        }
        let manager = builder.build()?;

        jobs.push(async move { manager.run(&spec, budget).await });
    }
    drop(tx);

    let results = join_all(jobs).await;
    let _ = display.await;

    for result in &results {
        print_result(result);
    }

    let failed = results
        .iter()
        .filter(|r| r.status == JobStatus::Failed)
        .count();
    if failed > 0 {
        anyhow::bail!("{} of {} job(s) failed", failed, results.len());
    }
    Ok(())
}

fn print_result(result: &JobResult) {
    let stats = &result.stats;
    println!();
    println!(
        "{} {}",
        style(&result.key).bold(),
        status_label(result.status)
    );
    println!(
        "  {:<14} {}/{} completed, {} failed",
        "Pages:",
        result.completed_pages.len(),
        result.total_pages,
        result.failed_pages.len()
    );
    println!(
        "  {:<14} {} ({} duplicates)",
        "Records:",
        format_number(result.records.len() as u64),
        format_number(stats.duplicates)
    );
    println!(
        "  {:<14} {} ({} retries, {} rate limited)",
        "Requests:",
        format_number(stats.requests),
        stats.retries,
        stats.rate_limited
    );
    println!(
        "  {:<14} {} (waited {})",
        "Elapsed:",
        format_duration(Duration::from_millis(stats.elapsed_ms)),
        format_duration(Duration::from_millis(stats.waited_ms))
    );
    if !result.failed_pages.is_empty() {
        println!("  {:<14} {:?}", "Failed pages:", result.failed_pages);
    }
    if result.status == JobStatus::Paused {
        println!(
            "  {} Budget exhausted at page {}; run again to resume",
            style("→").cyan(),
            result.current_page
        );
    }
    if let Some(ref error) = result.error {
        println!("  {:<14} {}", "Error:", style(error).red());
    }
    if let Some(ref key) = result.checkpoint_key {
        println!("  {:<14} {}", "Checkpoint:", style(key).dim());
    }
}
