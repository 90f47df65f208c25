//! harvest - resumable, rate-adaptive harvesting of paginated search results.
//!
//! The core library: it walks an unknown-length sequence of result pages,
//! paces itself from observed outcomes, deduplicates records across pages and
//! restarts, groups completed pages into batches for durable storage, and
//! checkpoints progress so a crash, a block, or a time budget can be resumed.
//!
//! Network access is delegated to the [`fetcher::PageFetcher`] and
//! [`fetcher::InitialStateLoader`] collaborators; durable storage to a
//! [`storage::Storage`] backend.

pub mod accumulator;
pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod identity;
pub mod models;
pub mod navigation;
pub mod rate_limit;
pub mod storage;

pub use accumulator::{MergeOutcome, ResultSet};
pub use batch::{BatchAssembler, BatchDocument, BatchHandle};
pub use checkpoint::CheckpointStore;
pub use config::{
    Config, EngineConfig, HttpMethod, IdentityConfig, LoadOptions, SearchApiConfig, Settings,
};
pub use engine::{
    HarvestEvent, PageArchiver, PageHandler, PaginationManager, PaginationManagerBuilder,
    WaitReason,
};
pub use error::{HarvestError, Result};
pub use fetcher::{
    FetchError, FetchErrorKind, FetchedPage, InitialStateLoader, PageFetcher, SeedPage,
};
pub use identity::RecordIdentity;
pub use models::{
    Batch, Checkpoint, JobKey, JobResult, JobSpec, JobState, JobStats, JobStatus,
    NavigationState, PageResult, PartialNavigationState, Record,
};
pub use navigation::NavigationExtractor;
pub use rate_limit::{Outcome, RateController, RateLimitConfig, RateState};
pub use storage::{FsStorage, MemoryStorage, Storage, StorageError};
