//! Pagination manager: the resumable harvesting control loop.
//!
//! One job runs as a single sequential worker. Each response can refresh the
//! navigation state the next request is built from, so pages are never
//! fetched in parallel. Per page the loop paces, fetches, classifies the
//! outcome, merges records, appends to the open batch and checkpoints, until
//! every page is processed, the time budget runs out, or storage fails.
//!
//! Every suspension point (pacing, backoff, cooldown, the fetch itself) is
//! bounded by the budget deadline and, for fetches, by the fetch timeout.

mod events;
mod handler;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::accumulator::ResultSet;
use crate::batch::BatchAssembler;
use crate::checkpoint::CheckpointStore;
use crate::config::EngineConfig;
use crate::error::{HarvestError, Result};
use crate::fetcher::{FetchError, FetchErrorKind, FetchedPage, InitialStateLoader, PageFetcher};
use crate::models::{
    derive_total_pages, Batch, BatchHandle, JobResult, JobSpec, JobState, JobStatus, Record,
};
use crate::navigation::NavigationExtractor;
use crate::rate_limit::{duration_ms, Outcome, RateController, RateLimitConfig};
use crate::storage::Storage;

pub use events::{HarvestEvent, WaitReason};
pub use handler::{PageArchiver, PageHandler};

/// Upper bound on delivering one event to a slow observer.
const EVENT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Drives harvesting jobs against a fetcher and a storage backend.
pub struct PaginationManager {
    config: EngineConfig,
    controller: RateController,
    extractor: NavigationExtractor,
    fetcher: Arc<dyn PageFetcher>,
    loader: Arc<dyn InitialStateLoader>,
    checkpoints: CheckpointStore,
    assembler: BatchAssembler,
    handlers: Vec<Arc<dyn PageHandler>>,
    events: Option<mpsc::Sender<HarvestEvent>>,
}

/// Builder for [`PaginationManager`].
pub struct PaginationManagerBuilder {
    config: EngineConfig,
    extractor: NavigationExtractor,
    fetcher: Arc<dyn PageFetcher>,
    loader: Arc<dyn InitialStateLoader>,
    storage: Arc<dyn Storage>,
    handlers: Vec<Arc<dyn PageHandler>>,
    events: Option<mpsc::Sender<HarvestEvent>>,
}

impl PaginationManagerBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn extractor(mut self, extractor: NavigationExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Add an "on page completed" hook.
    pub fn handler(mut self, handler: Arc<dyn PageHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Send progress events to `tx`.
    pub fn events(mut self, tx: mpsc::Sender<HarvestEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn build(self) -> Result<PaginationManager> {
        self.config.validate()?;
        Ok(PaginationManager {
            controller: RateController::new(RateLimitConfig::from(&self.config)),
            checkpoints: CheckpointStore::new(self.storage.clone()),
            assembler: BatchAssembler::new(self.config.batch_size, self.storage),
            config: self.config,
            extractor: self.extractor,
            fetcher: self.fetcher,
            loader: self.loader,
            handlers: self.handlers,
            events: self.events,
        })
    }
}

impl PaginationManager {
    pub fn builder(
        fetcher: Arc<dyn PageFetcher>,
        loader: Arc<dyn InitialStateLoader>,
        storage: Arc<dyn Storage>,
    ) -> PaginationManagerBuilder {
        PaginationManagerBuilder {
            config: EngineConfig::default(),
            extractor: NavigationExtractor::default(),
            fetcher,
            loader,
            storage,
            handlers: Vec::new(),
            events: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Run a job until it completes, the budget expires, or it fails.
    ///
    /// Never returns an error: failures are reported through the result's
    /// status, and a checkpoint is written on every exit path that has
    /// progress to record.
    pub async fn run(&self, job: &JobSpec, budget: Option<Duration>) -> JobResult {
        let started = Instant::now();
        let deadline = budget.map(|b| started + b);

        let restored = match self.checkpoints.load_checkpoint(&job.key).await {
            Ok(restored) => restored,
            Err(e) => {
                error!("[{}] Cannot read checkpoint: {}", job.key, e);
                let mut state = JobState::new(job.key.clone(), self.controller.initial_state());
                state.status = JobStatus::Failed;
                state.last_error = Some(e.to_string());
                return JobRun::new(self, job, state, started, deadline)
                    .into_result(JobStatus::Failed);
            }
        };

        let resumed = restored.is_some();
        let state = match restored {
            Some(checkpoint) => {
                info!(
                    "[{}] Resuming from checkpoint ({} page(s) completed, {} failed)",
                    job.key,
                    checkpoint.completed_pages.len(),
                    checkpoint.failed_pages.len()
                );
                checkpoint.into_state()
            }
            None => JobState::new(job.key.clone(), self.controller.initial_state()),
        };

        let mut run = JobRun::new(self, job, state, started, deadline);
        if resumed {
            run.checkpoint_key = Some(CheckpointStore::key_for(&job.key));
        }
        run.execute(resumed).await
    }

    async fn emit(&self, event: HarvestEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send_timeout(event, EVENT_SEND_TIMEOUT).await;
        }
    }
}

/// How processing one page ended.
enum PageOutcome {
    Completed,
    Failed,
    /// Budget ran out before the page could be resolved.
    Paused,
}

/// How the page loop ended.
enum LoopEnd {
    Completed,
    Paused,
}

/// State of one `run()` invocation.
struct JobRun<'a> {
    manager: &'a PaginationManager,
    job: &'a JobSpec,
    state: JobState,
    results: ResultSet,
    max_pages: u32,
    started: Instant,
    deadline: Option<Instant>,
    prior_elapsed_ms: u64,
    pages_since_checkpoint: u32,
    consecutive_failures: u32,
    checkpoint_key: Option<String>,
}

impl<'a> JobRun<'a> {
    fn new(
        manager: &'a PaginationManager,
        job: &'a JobSpec,
        state: JobState,
        started: Instant,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            max_pages: job.max_pages.unwrap_or(manager.config.max_pages).max(1),
            prior_elapsed_ms: state.stats.elapsed_ms,
            manager,
            job,
            state,
            results: ResultSet::new(),
            started,
            deadline,
            pages_since_checkpoint: 0,
            consecutive_failures: 0,
            checkpoint_key: None,
        }
    }

    async fn execute(mut self, resumed: bool) -> JobResult {
        self.state.status = JobStatus::Running;
        self.state.stats.runs += 1;
        if self.state.stats.started_at.is_none() {
            self.state.stats.started_at = Some(Utc::now());
        }

        match self.drive(resumed).await {
            Ok(LoopEnd::Completed) => self.finish_completed().await,
            Ok(LoopEnd::Paused) => self.finish_paused().await,
            Err(e) => self.finish_failed(e).await,
        }
    }

    async fn drive(&mut self, resumed: bool) -> Result<LoopEnd> {
        if resumed {
            self.rehydrate().await?;
        }

        if !self.state.is_seeded() {
            if !self.seed().await? {
                return Ok(LoopEnd::Paused);
            }
            self.save_checkpoint().await?;
        } else {
            self.state.total_pages = derive_total_pages(self.state.reported_pages, self.max_pages);
        }

        info!(
            "[{}] Harvesting {} page(s) (max {})",
            self.state.key, self.state.total_pages, self.max_pages
        );
        self.manager
            .emit(HarvestEvent::JobStarted {
                job: self.state.key.clone(),
                total_pages: self.state.total_pages,
                resumed,
            })
            .await;

        if self.state.total_pages <= 1 {
            return Ok(LoopEnd::Completed);
        }

        self.harvest_pages().await
    }

    /// Rebuild the result set from flushed batches and the open batch.
    ///
    /// Records are replayed in page order. Pages of a batch that has gone
    /// missing from storage are re-queued.
    async fn rehydrate(&mut self) -> Result<()> {
        let mut handles = std::mem::take(&mut self.state.batches);
        handles.sort_by_key(|handle| handle.start_page);

        let mut segments = Vec::with_capacity(handles.len() + 1);
        for handle in handles {
            match self.manager.assembler.load(&handle).await? {
                Some(document) => {
                    segments.push((document.start_page, document.records));
                    self.state.batches.push(handle);
                }
                None => {
                    warn!(
                        "[{}] Batch {} is missing from storage, re-queueing pages {:?}",
                        self.state.key, handle.key, handle.pages
                    );
                    for page in &handle.pages {
                        self.state.completed_pages.remove(page);
                    }
                    let first = handle.pages.iter().copied().filter(|p| *p > 1).min();
                    if let Some(first) = first {
                        self.state.current_page = self.state.current_page.min(first);
                    }
                }
            }
        }
        if let Some(start) = self.state.open_batch.start_page() {
            segments.push((start, self.state.open_batch.records.clone()));
        }
        segments.sort_by_key(|(start, _)| *start);

        for (_, records) in segments {
            self.results.extend(records);
        }
        self.state.stats.records = self.results.len() as u64;
        debug!(
            "[{}] Rehydrated {} record(s) from {} batch(es)",
            self.state.key,
            self.results.len(),
            self.state.batches.len()
        );
        Ok(())
    }

    /// Load the first page, which fixes the page count and seeds navigation.
    ///
    /// Returns false if the budget ran out first. Exhausting the retries is
    /// an error: without a first page there is nothing to paginate.
    async fn seed(&mut self) -> Result<bool> {
        let manager = self.manager;
        let max_retries = self.manager.config.max_retries;
        let mut last_error: Option<FetchError> = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let delay = self.retry_delay(attempt, last_error.as_ref());
                if !self.wait(1, delay, WaitReason::Backoff).await {
                    return Ok(false);
                }
                self.state.stats.retries += 1;
            } else if self.expired() {
                return Ok(false);
            }

            self.state.stats.requests += 1;
            let Some(result) = self.bounded(manager.loader.load_first_page(self.job)).await else {
                return Ok(false);
            };

            let error = match result {
                Ok(seed) if seed.page.result.is_empty() && seed.page.result.total_count != Some(0) => {
                    self.state.stats.empty_responses += 1;
                    FetchError::invalid("first page returned no records")
                }
                Ok(seed) => {
                    self.record_outcome(Outcome::Success);
                    self.state.navigation = seed.navigation;
                    self.state.reported_pages = seed.page.result.reported_pages();
                    self.state.total_pages =
                        derive_total_pages(self.state.reported_pages, self.max_pages);
                    if self.state.current_page < 2 {
                        self.state.current_page = self.job.start_page.unwrap_or(2).max(2);
                    }
                    self.accept_page(1, seed.page).await?;
                    return Ok(true);
                }
                Err(e) => {
                    self.count_error(&e);
                    e
                }
            };

            self.record_failure(1, attempt, &error);
            last_error = Some(error);
        }

        let error = last_error.unwrap_or_else(|| FetchError::transport("first page not loaded"));
        Err(HarvestError::Fetch(error))
    }

    async fn harvest_pages(&mut self) -> Result<LoopEnd> {
        let pending = self.state.pending_pages(self.job.retry_failed);
        let threshold = self.manager.config.consecutive_failures_for_cooldown;
        let mut cooldown_due = false;

        for page in pending {
            if self.expired() {
                self.pause_before(page);
                return Ok(LoopEnd::Paused);
            }

            if cooldown_due {
                cooldown_due = false;
                self.state.stats.cooldowns += 1;
                let cooldown = self.manager.config.block_cooldown();
                warn!(
                    "[{}] {} consecutive failed pages, probable block; cooling down for {:?}",
                    self.state.key, threshold, cooldown
                );
                if !self.wait(page, cooldown, WaitReason::Cooldown).await {
                    self.pause_before(page);
                    return Ok(LoopEnd::Paused);
                }
            }

            match self.harvest_page(page).await? {
                PageOutcome::Paused => {
                    self.pause_before(page);
                    return Ok(LoopEnd::Paused);
                }
                PageOutcome::Completed => self.consecutive_failures = 0,
                PageOutcome::Failed => {
                    self.consecutive_failures += 1;
                    if threshold > 0 && self.consecutive_failures >= threshold {
                        cooldown_due = true;
                        self.consecutive_failures = 0;
                    }
                }
            }

            self.state.current_page = self.state.current_page.max(page + 1);
            self.pages_since_checkpoint += 1;
            if self.pages_since_checkpoint >= self.manager.config.checkpoint_interval {
                self.save_checkpoint().await?;
            }
        }

        Ok(LoopEnd::Completed)
    }

    /// Fetch one page with retries.
    async fn harvest_page(&mut self, page: u32) -> Result<PageOutcome> {
        let manager = self.manager;
        let max_retries = self.manager.config.max_retries;
        let mut last_error: Option<FetchError> = None;

        for attempt in 0..=max_retries {
            let (delay, reason) = if attempt == 0 {
                let (delay, next) = self.manager.controller.next_delay_random(&self.state.rate);
                self.state.rate = next;
                (delay, WaitReason::Pacing)
            } else {
                (self.retry_delay(attempt, last_error.as_ref()), WaitReason::Backoff)
            };
            if !self.wait(page, delay, reason).await {
                return Ok(PageOutcome::Paused);
            }

            self.state.stats.requests += 1;
            if attempt > 0 {
                self.state.stats.retries += 1;
            }

            let navigation = self.state.navigation.clone();
            let Some(result) = self.bounded(manager.fetcher.fetch_page(page, &navigation)).await
            else {
                return Ok(PageOutcome::Paused);
            };

            let error = match result {
                Ok(fetched) if fetched.result.is_empty() => {
                    self.state.stats.empty_responses += 1;
                    FetchError::invalid(format!("page {} returned no records", page))
                }
                Ok(fetched) => {
                    self.record_outcome(Outcome::Success);
                    self.accept_page(page, fetched).await?;
                    return Ok(PageOutcome::Completed);
                }
                Err(e) => {
                    self.count_error(&e);
                    e
                }
            };

            self.record_failure(page, attempt, &error);
            last_error = Some(error);
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        warn!(
            "[{}] Page {} failed after {} attempt(s): {}",
            self.state.key,
            page,
            max_retries + 1,
            message
        );
        self.state.mark_failed(page);
        self.manager
            .emit(HarvestEvent::PageFailed {
                job: self.state.key.clone(),
                page,
                attempts: max_retries + 1,
                error: message,
            })
            .await;
        Ok(PageOutcome::Failed)
    }

    /// Merge a successful page: records, batch, navigation, handlers.
    async fn accept_page(&mut self, page: u32, fetched: FetchedPage) -> Result<()> {
        let merge = self.results.merge(&fetched.result);
        self.state.stats.records = self.results.len() as u64;
        self.state.stats.duplicates += merge.duplicates as u64;

        if merge.is_stalled() {
            self.state.stats.stalled_pages += 1;
            warn!(
                "[{}] Page {} yielded no new records ({} duplicates), upstream may be looping",
                self.state.key, page, merge.duplicates
            );
        }

        self.refresh_navigation(&fetched);

        for handler in &self.manager.handlers {
            if let Err(e) = handler
                .on_page_completed(&self.state.key, &fetched, &merge.new_records)
                .await
            {
                warn!(
                    "[{}] Handler '{}' failed on page {}: {}",
                    self.state.key,
                    handler.name(),
                    page,
                    e
                );
            }
        }

        let flushed = self.place_page(page, merge.new_records.clone()).await?;
        self.state.mark_completed(page);
        info!(
            "[{}] Page {}/{}: {} new, {} duplicate(s), {} total",
            self.state.key,
            page,
            self.state.total_pages,
            merge.merged_count(),
            merge.duplicates,
            self.results.len()
        );
        self.manager
            .emit(HarvestEvent::PageCompleted {
                job: self.state.key.clone(),
                page,
                new_records: merge.merged_count(),
                duplicates: merge.duplicates,
                total_records: self.results.len(),
            })
            .await;

        if flushed {
            self.save_checkpoint().await?;
        }
        Ok(())
    }

    /// Store a completed page's records, keeping batch ranges disjoint.
    ///
    /// A page inside the range of a flushed batch joins that batch. If adding
    /// the page would stretch the open batch over a flushed one, the open
    /// batch is flushed first and the page starts a new one. Returns whether
    /// a batch was written.
    async fn place_page(&mut self, page: u32, records: Vec<Record>) -> Result<bool> {
        let manager = self.manager;

        if let Some(index) = self.state.batches.iter().position(|h| h.covers(page)) {
            let handle = manager
                .assembler
                .amend(&self.state.key, &self.state.batches[index], page, records)
                .await?;
            self.record_flush(handle).await;
            return Ok(true);
        }

        let mut flushed = false;
        let (start, end) = self.state.open_batch.range_with(page);
        if !self.state.open_batch.is_empty()
            && self.state.batches.iter().any(|h| h.overlaps(start, end))
        {
            self.write_open_batch().await?;
            flushed = true;
        }

        manager
            .assembler
            .append(&mut self.state.open_batch, page, records);
        if manager.assembler.is_full(&self.state.open_batch) {
            self.write_open_batch().await?;
            flushed = true;
        }
        Ok(flushed)
    }

    fn refresh_navigation(&mut self, fetched: &FetchedPage) {
        let mut update = fetched
            .envelope
            .as_ref()
            .map(|envelope| self.manager.extractor.extract(envelope))
            .unwrap_or_default();
        update.cookies.extend(fetched.cookies.clone());

        if self.state.navigation.apply(update) {
            debug!("[{}] Navigation state refreshed", self.state.key);
        }

        if !self.state.navigation.has_continuation() && !self.state.stats.navigation_degraded {
            self.state.stats.navigation_degraded = true;
            warn!(
                "[{}] No continuation token in response; continuing with page-number addressing",
                self.state.key
            );
        }
    }

    async fn flush_open_batch(&mut self) -> Result<()> {
        self.write_open_batch().await?;
        self.save_checkpoint().await
    }

    async fn write_open_batch(&mut self) -> Result<()> {
        let handle = self
            .manager
            .assembler
            .flush(&self.state.key, &self.state.open_batch)
            .await?;
        self.state.open_batch = Batch::default();
        self.record_flush(handle).await;
        Ok(())
    }

    /// Track a written batch in the manifest, ordered by start page.
    async fn record_flush(&mut self, handle: BatchHandle) {
        info!(
            "[{}] Flushed batch of pages {}-{} ({} records)",
            self.state.key, handle.start_page, handle.end_page, handle.record_count
        );
        self.manager
            .emit(HarvestEvent::BatchFlushed {
                job: self.state.key.clone(),
                key: handle.key.clone(),
                start_page: handle.start_page,
                end_page: handle.end_page,
                record_count: handle.record_count,
            })
            .await;

        self.state.batches.retain(|existing| existing.key != handle.key);
        self.state.batches.push(handle);
        self.state.batches.sort_by_key(|h| h.start_page);
        self.state.stats.batches_flushed += 1;
    }

    async fn save_checkpoint(&mut self) -> Result<()> {
        self.sync_stats();
        self.state.stats.checkpoints_saved += 1;
        let key = self.manager.checkpoints.save(&self.state).await?;
        self.pages_since_checkpoint = 0;
        self.manager
            .emit(HarvestEvent::CheckpointSaved {
                job: self.state.key.clone(),
                key: key.clone(),
                current_page: self.state.current_page,
            })
            .await;
        self.checkpoint_key = Some(key);
        Ok(())
    }

    fn sync_stats(&mut self) {
        self.state.stats.total_pages = self.state.total_pages;
        self.state.stats.records = self.results.len() as u64;
        self.state.stats.elapsed_ms =
            self.prior_elapsed_ms + duration_ms(self.started.elapsed());
    }

    fn record_outcome(&mut self, outcome: Outcome) {
        self.state.rate = self
            .manager
            .controller
            .record_outcome(&self.state.rate, outcome);
    }

    fn count_error(&mut self, error: &FetchError) {
        let stats = &mut self.state.stats;
        match error.kind {
            FetchErrorKind::RateLimited => stats.rate_limited += 1,
            FetchErrorKind::Transport => stats.transport_errors += 1,
            FetchErrorKind::InvalidResponse => stats.invalid_responses += 1,
        }
    }

    fn record_failure(&mut self, page: u32, attempt: u32, error: &FetchError) {
        self.record_outcome(Outcome::from(error.kind));
        self.state.last_error = Some(error.to_string());
        warn!(
            "[{}] Page {} attempt {}/{} failed: {}",
            self.state.key,
            page,
            attempt + 1,
            self.manager.config.max_retries + 1,
            error
        );
    }

    /// Backoff before retry `attempt`, floored by any `Retry-After`.
    fn retry_delay(&mut self, attempt: u32, last_error: Option<&FetchError>) -> Duration {
        let (delay, next) = self
            .manager
            .controller
            .retry_delay(attempt, &self.state.rate);
        self.state.rate = next;
        let floor = last_error
            .and_then(|e| e.retry_after)
            .map(|after| after.min(self.manager.config.max_delay()))
            .unwrap_or_default();
        delay.max(floor)
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn pause_before(&mut self, page: u32) {
        self.state.current_page = self.state.current_page.min(page);
    }

    /// Sleep for `delay`, or until the deadline if that comes first.
    ///
    /// Returns false if the deadline cut the wait short.
    async fn wait(&mut self, page: u32, delay: Duration, reason: WaitReason) -> bool {
        if delay.is_zero() {
            return !self.expired();
        }

        debug!(
            "[{}] Waiting {:?} before page {} ({})",
            self.state.key,
            delay,
            page,
            reason.as_str()
        );
        self.manager
            .emit(HarvestEvent::Waiting {
                job: self.state.key.clone(),
                page,
                delay,
                reason,
            })
            .await;

        let now = Instant::now();
        let wake = now + delay;
        let completed = match self.deadline {
            Some(deadline) if wake > deadline => {
                tokio::time::sleep_until(deadline).await;
                false
            }
            _ => {
                tokio::time::sleep_until(wake).await;
                true
            }
        };
        self.state.stats.waited_ms += duration_ms(now.elapsed());
        completed
    }

    /// Run a collaborator call under the fetch timeout and the deadline.
    ///
    /// `None` means the deadline passed first.
    async fn bounded<T, F>(&self, call: F) -> Option<std::result::Result<T, FetchError>>
    where
        F: Future<Output = std::result::Result<T, FetchError>>,
    {
        let timeout = self.manager.config.fetch_timeout();
        let timed = async move {
            match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::transport(format!(
                    "no response within {}s",
                    timeout.as_secs()
                ))),
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                result = timed => Some(result),
                _ = tokio::time::sleep_until(deadline) => None,
            },
            None => Some(timed.await),
        }
    }

    async fn finish_completed(mut self) -> JobResult {
        if !self.state.open_batch.is_empty() {
            if let Err(e) = self.flush_open_batch().await {
                return self.finish_failed(e).await;
            }
        }
        self.state.status = JobStatus::Completed;
        self.state.stats.finished_at = Some(Utc::now());
        if let Err(e) = self.save_checkpoint().await {
            return self.finish_failed(e).await;
        }
        info!(
            "[{}] Completed: {} page(s), {} failed, {} record(s)",
            self.state.key,
            self.state.completed_pages.len(),
            self.state.failed_pages.len(),
            self.results.len()
        );
        self.report(JobStatus::Completed).await
    }

    async fn finish_paused(mut self) -> JobResult {
        self.state.status = JobStatus::Paused;
        if let Err(e) = self.save_checkpoint().await {
            return self.finish_failed(e).await;
        }
        info!(
            "[{}] Budget exhausted at page {}/{}, paused",
            self.state.key, self.state.current_page, self.state.total_pages
        );
        self.report(JobStatus::Paused).await
    }

    async fn finish_failed(mut self, error: HarvestError) -> JobResult {
        error!("[{}] Job failed: {}", self.state.key, error);
        self.state.status = JobStatus::Failed;
        self.state.last_error = Some(error.to_string());
        self.state.stats.finished_at = Some(Utc::now());
        if let Err(e) = self.save_checkpoint().await {
            error!("[{}] Final checkpoint also failed: {}", self.state.key, e);
        }
        self.report(JobStatus::Failed).await
    }

    async fn report(mut self, status: JobStatus) -> JobResult {
        self.manager
            .emit(HarvestEvent::JobFinished {
                job: self.state.key.clone(),
                status,
                completed_pages: self.state.completed_pages.len(),
                failed_pages: self.state.failed_pages.len(),
            })
            .await;
        self.sync_stats();
        self.into_result(status)
    }

    fn into_result(self, status: JobStatus) -> JobResult {
        let error = match status {
            JobStatus::Failed => self.state.last_error.clone(),
            _ => None,
        };
        JobResult {
            key: self.state.key.clone(),
            status,
            total_pages: self.state.total_pages,
            current_page: self.state.current_page,
            completed_pages: self.state.completed_pages.iter().copied().collect(),
            failed_pages: self.state.failed_pages.iter().copied().collect(),
            stats: self.state.stats.clone(),
            checkpoint_key: self.checkpoint_key,
            records: self.results.into_records(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::SeedPage;
    use crate::models::{NavigationState, PageResult, Record};
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use serde_json::json;

    struct StaticSource {
        pages: u32,
    }

    fn page(number: u32) -> PageResult {
        let records = (0..3)
            .map(|i| {
                let id = format!("{}-{}", number, i);
                Record::with_id(id.clone(), json!({"lotNumber": id}))
            })
            .collect();
        PageResult::new(number, records).with_totals(Some(u64::from(3u32 * 2)), Some(3))
    }

    #[async_trait]
    impl PageFetcher for StaticSource {
        async fn fetch_page(
            &self,
            page_number: u32,
            _navigation: &NavigationState,
        ) -> std::result::Result<FetchedPage, FetchError> {
            if page_number > self.pages {
                return Ok(FetchedPage::new(PageResult::new(page_number, vec![])));
            }
            Ok(FetchedPage::new(page(page_number)).with_envelope(json!({"refId": "r2"})))
        }
    }

    #[async_trait]
    impl InitialStateLoader for StaticSource {
        async fn load_first_page(&self, _job: &JobSpec) -> std::result::Result<SeedPage, FetchError> {
            Ok(SeedPage {
                page: FetchedPage::new(page(1)),
                navigation: NavigationState {
                    ref_id: Some("r1".into()),
                    ..Default::default()
                },
            })
        }
    }

    fn manager(storage: MemoryStorage) -> PaginationManager {
        let source = Arc::new(StaticSource { pages: 2 });
        PaginationManager::builder(source.clone(), source, Arc::new(storage))
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_page_job_completes() {
        let storage = MemoryStorage::new();
        let result = manager(storage.clone()).run(&JobSpec::new("cars", "ford"), None).await;

        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.total_pages, 2);
        assert_eq!(result.completed_pages, vec![1, 2]);
        assert_eq!(result.records.len(), 6);
        assert!(result.checkpoint_key.is_some());
        assert_eq!(storage.keys_with_prefix("batches/").await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_rejected() {
        let source = Arc::new(StaticSource { pages: 1 });
        let config = EngineConfig {
            batch_size: 0,
            ..Default::default()
        };
        let built = PaginationManager::builder(source.clone(), source, Arc::new(MemoryStorage::new()))
            .config(config)
            .build();
        assert!(matches!(built, Err(HarvestError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_refreshed_from_envelope() {
        let storage = MemoryStorage::new();
        let manager = manager(storage.clone());
        let job = JobSpec::new("cars", "ford");
        manager.run(&job, None).await;

        let state = manager.checkpoints().load("cars", "ford").await.unwrap().unwrap();
        assert_eq!(state.navigation.ref_id.as_deref(), Some("r2"));
        assert!(!state.stats.navigation_degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_pauses_before_any_fetch() {
        let storage = MemoryStorage::new();
        let result = manager(storage)
            .run(&JobSpec::new("cars", "ford"), Some(Duration::ZERO))
            .await;
        assert_eq!(result.status, JobStatus::Paused);
        assert_eq!(result.stats.requests, 0);
        assert!(result.completed_pages.is_empty());
    }
}
