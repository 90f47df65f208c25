//! Batches command: list the flushed batches of a job.

use console::style;

use harvest::{JobKey, Settings, Storage};

use super::helpers::{format_number, load_checkpoint, open_storage};

pub async fn cmd_batches(settings: &Settings, category: &str, query: &str) -> anyhow::Result<()> {
    let key = JobKey::new(category, query);
    let Some(checkpoint) = load_checkpoint(settings, &key).await? else {
        return Ok(());
    };
    let storage = open_storage(settings)?;

    if checkpoint.batches.is_empty() {
        println!("No batches flushed yet for {}", style(&key).cyan());
        return Ok(());
    }

    println!(
        "{:<8} {:>8} {:>8} {:>10}  {}",
        style("PAGES").bold(),
        style("COUNT").bold(),
        style("RECORDS").bold(),
        style("STORED").bold(),
        style("KEY").bold()
    );
    let mut total = 0u64;
    for batch in &checkpoint.batches {
        let stored = if storage.exists(&batch.key).await? {
            style("yes").green()
        } else {
            style("missing").red()
        };
        println!(
            "{:<8} {:>8} {:>8} {:>10}  {}",
            format!("{}-{}", batch.start_page, batch.end_page),
            batch.pages.len(),
            format_number(batch.record_count as u64),
            stored,
            style(&batch.key).dim()
        );
        total += batch.record_count as u64;
    }
    println!();
    println!(
        "{} batch(es), {} record(s); {} page(s) not yet flushed",
        checkpoint.batches.len(),
        format_number(total),
        checkpoint.open_batch.page_count()
    );
    Ok(())
}
