//! Data model for harvesting jobs.

mod batch;
mod checkpoint;
mod job;
mod navigation;
mod page;
mod record;

pub use batch::{Batch, BatchHandle};
pub use checkpoint::{Checkpoint, CHECKPOINT_VERSION};
pub use job::{JobKey, JobResult, JobSpec, JobState, JobStats, JobStatus};
pub use navigation::{NavigationState, PartialNavigationState};
pub use page::{derive_total_pages, PageResult};
pub use record::Record;
