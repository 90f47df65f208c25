//! Multi-progress display for concurrent harvesting jobs.

use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use harvest::{HarvestEvent, JobKey, JobStatus, WaitReason};

/// One progress bar per job, driven by engine events.
pub struct JobProgress {
    multi: MultiProgress,
    bars: HashMap<JobKey, ProgressBar>,
    style: ProgressStyle,
}

impl JobProgress {
    pub fn new() -> Self {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
            style,
        }
    }

    fn bar(&mut self, job: &JobKey) -> &ProgressBar {
        let multi = &self.multi;
        let style = &self.style;
        self.bars.entry(job.clone()).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(0));
            bar.set_style(style.clone());
            bar.set_prefix(job.to_string());
            bar
        })
    }

    /// Apply one event to the display.
    pub fn handle(&mut self, event: &HarvestEvent) {
        match event {
            HarvestEvent::JobStarted {
                job,
                total_pages,
                resumed,
            } => {
                let bar = self.bar(job);
                bar.set_length(u64::from(*total_pages));
                bar.set_message(if *resumed { "resuming" } else { "started" });
            }
            HarvestEvent::Waiting {
                job,
                page,
                delay,
                reason,
            } => {
                let message = match reason {
                    WaitReason::Pacing => format!("page {}", page),
                    WaitReason::Backoff => format!("page {} retry in {:.1}s", page, delay.as_secs_f64()),
                    WaitReason::Cooldown => {
                        format!("cooling down {}s before page {}", delay.as_secs(), page)
                    }
                };
                self.bar(job).set_message(message);
            }
            HarvestEvent::PageCompleted {
                job,
                total_records,
                ..
            } => {
                let bar = self.bar(job);
                bar.inc(1);
                bar.set_message(format!("{} records", total_records));
            }
            HarvestEvent::PageFailed { job, page, .. } => {
                let bar = self.bar(job);
                bar.inc(1);
                bar.set_message(format!("page {} failed", page));
            }
            HarvestEvent::JobFinished { job, status, .. } => {
                let bar = self.bar(job);
                match status {
                    JobStatus::Completed => bar.finish_with_message("completed"),
                    other => bar.abandon_with_message(other.to_string()),
                }
            }
            HarvestEvent::BatchFlushed { .. } | HarvestEvent::CheckpointSaved { .. } => {}
        }
    }

    /// Consume events until every sender is dropped.
    pub async fn drive(mut self, mut rx: mpsc::Receiver<HarvestEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(&event);
        }
        let _ = self.multi.clear();
    }
}

/// Swallow events when no display is wanted.
pub async fn discard(mut rx: mpsc::Receiver<HarvestEvent>) {
    while rx.recv().await.is_some() {}
}
