//! Status command: show a job's checkpoint.

use std::time::Duration;

use chrono::Local;
use console::style;

use harvest::{Checkpoint, JobKey, Settings};

use super::helpers::{format_duration, format_number, load_checkpoint, status_label};

pub async fn cmd_status(
    settings: &Settings,
    category: &str,
    query: &str,
    json: bool,
) -> anyhow::Result<()> {
    let key = JobKey::new(category, query);
    let Some(checkpoint) = load_checkpoint(settings, &key).await? else {
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoint)?);
    } else {
        display_checkpoint(&checkpoint);
    }
    Ok(())
}

fn display_checkpoint(checkpoint: &Checkpoint) {
    let stats = &checkpoint.stats;
    let separator = "─".repeat(60);

    println!();
    println!(
        "{:<44} {}",
        style(checkpoint.key()).bold(),
        status_label(checkpoint.status)
    );
    println!("{}", separator);

    println!("{}", style("PAGES").cyan().bold());
    println!("  {:<20} {:>10}", "Total:", checkpoint.total_pages);
    println!("  {:<20} {:>10}", "Completed:", checkpoint.completed_pages.len());
    println!("  {:<20} {:>10}", "Failed:", checkpoint.failed_pages.len());
    println!("  {:<20} {:>10}", "Next page:", checkpoint.current_page);
    if let Some(reported) = checkpoint.reported_pages {
        println!("  {:<20} {:>10}", "Reported upstream:", reported);
    }

    println!("{}", style("RECORDS").cyan().bold());
    println!("  {:<20} {:>10}", "Unique:", format_number(stats.records));
    println!("  {:<20} {:>10}", "Duplicates:", format_number(stats.duplicates));
    println!("  {:<20} {:>10}", "Batches:", checkpoint.batches.len());
    println!(
        "  {:<20} {:>10}",
        "Unflushed pages:",
        checkpoint.open_batch.page_count()
    );

    println!("{}", style("REQUESTS").cyan().bold());
    println!("  {:<20} {:>10}", "Sent:", format_number(stats.requests));
    println!("  {:<20} {:>10}", "Retries:", stats.retries);
    println!("  {:<20} {:>10}", "Rate limited:", stats.rate_limited);
    println!("  {:<20} {:>10}", "Transport errors:", stats.transport_errors);
    println!("  {:<20} {:>10}", "Empty responses:", stats.empty_responses);
    println!("  {:<20} {:>10}", "Stalled pages:", stats.stalled_pages);
    println!("  {:<20} {:>10}", "Cooldowns:", stats.cooldowns);
    println!(
        "  {:<20} {:>10}",
        "Current delay:",
        format!("{}ms", checkpoint.rate.current_delay_ms)
    );

    println!("{}", style("RUNS").cyan().bold());
    println!("  {:<20} {:>10}", "Runs:", stats.runs);
    println!(
        "  {:<20} {:>10}",
        "Elapsed:",
        format_duration(Duration::from_millis(stats.elapsed_ms))
    );
    println!(
        "  {:<20} {}",
        "Saved:",
        checkpoint
            .saved_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    if stats.navigation_degraded {
        println!(
            "  {} No continuation token seen; pages addressed by number only",
            style("!").yellow()
        );
    }
    if !checkpoint.failed_pages.is_empty() {
        println!("  {:<20} {:?}", "Failed pages:", checkpoint.failed_pages);
    }
    if let Some(ref error) = checkpoint.last_error {
        println!("  {:<20} {}", "Last error:", style(error).red());
    }
}
