//! Progress events emitted while a job runs.

use std::time::Duration;

use crate::models::{JobKey, JobStatus};

/// Why the engine is suspended before a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Ordinary inter-request delay.
    Pacing,
    /// Backoff before retrying the same page.
    Backoff,
    /// Extended pause after consecutive failed pages.
    Cooldown,
}

impl WaitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pacing => "pacing",
            Self::Backoff => "backoff",
            Self::Cooldown => "cooldown",
        }
    }
}

/// Events sent to an optional observer channel.
#[derive(Debug, Clone, PartialEq)]
pub enum HarvestEvent {
    JobStarted {
        job: JobKey,
        total_pages: u32,
        resumed: bool,
    },
    Waiting {
        job: JobKey,
        page: u32,
        delay: Duration,
        reason: WaitReason,
    },
    PageCompleted {
        job: JobKey,
        page: u32,
        new_records: usize,
        duplicates: usize,
        total_records: usize,
    },
    PageFailed {
        job: JobKey,
        page: u32,
        attempts: u32,
        error: String,
    },
    BatchFlushed {
        job: JobKey,
        key: String,
        start_page: u32,
        end_page: u32,
        record_count: usize,
    },
    CheckpointSaved {
        job: JobKey,
        key: String,
        current_page: u32,
    },
    JobFinished {
        job: JobKey,
        status: JobStatus,
        completed_pages: usize,
        failed_pages: usize,
    },
}
