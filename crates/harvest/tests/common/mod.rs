//! Scripted collaborators for engine integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use harvest::{
    EngineConfig, FetchError, FetchedPage, HarvestEvent, InitialStateLoader, JobSpec,
    MemoryStorage, NavigationState, PageFetcher, PageResult, PaginationManager, Record, SeedPage,
};

/// One scripted response for a page.
#[derive(Debug, Clone)]
pub enum Step {
    Ok,
    Empty,
    RateLimited,
    /// Throttled with a `Retry-After` hint.
    RateLimitedFor(Duration),
    Transport,
    Invalid,
}

/// Upstream simulator: every page succeeds unless a script says otherwise.
pub struct ScriptedFetcher {
    total_count: u64,
    hits_per_page: u32,
    send_ref_ids: bool,
    scripts: Mutex<HashMap<u32, VecDeque<Step>>>,
    overrides: Mutex<HashMap<u32, Vec<String>>>,
    calls: Mutex<Vec<u32>>,
    seen: Mutex<Vec<(u32, NavigationState)>>,
}

impl ScriptedFetcher {
    pub fn new(total_count: u64, hits_per_page: u32) -> Self {
        Self {
            total_count,
            hits_per_page,
            send_ref_ids: true,
            scripts: Mutex::new(HashMap::new()),
            overrides: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Responses carry no continuation token.
    pub fn without_ref_ids(mut self) -> Self {
        self.send_ref_ids = false;
        self
    }

    /// Play `steps` for `page` before falling back to success.
    pub fn script(self, page: u32, steps: &[Step]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(page, steps.iter().cloned().collect());
        self
    }

    /// Fail every attempt at `page` with `step`.
    pub fn always(self, page: u32, step: Step, attempts: usize) -> Self {
        let steps = vec![step; attempts];
        self.script(page, &steps)
    }

    /// Serve these record ids on `page` instead of the generated ones.
    pub fn with_records(self, page: u32, ids: Vec<String>) -> Self {
        self.overrides.lock().unwrap().insert(page, ids);
        self
    }

    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, page: u32) -> usize {
        self.calls().iter().filter(|p| **p == page).count()
    }

    /// Navigation state each follow-up request was made with.
    pub fn seen(&self) -> Vec<(u32, NavigationState)> {
        self.seen.lock().unwrap().clone()
    }

    pub fn ids_for(&self, page: u32) -> Vec<String> {
        if let Some(ids) = self.overrides.lock().unwrap().get(&page) {
            return ids.clone();
        }
        (0..self.hits_per_page)
            .map(|i| format!("lot-{}-{}", page, i))
            .collect()
    }

    fn respond(&self, page: u32) -> Result<FetchedPage, FetchError> {
        self.calls.lock().unwrap().push(page);
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&page)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(Step::Ok);

        match step {
            Step::RateLimited => Err(FetchError::rate_limited("HTTP 429").with_status(429)),
            Step::RateLimitedFor(after) => Err(FetchError::rate_limited("HTTP 503")
                .with_status(503)
                .with_retry_after(Some(after))),
            Step::Transport => Err(FetchError::transport("connection reset")),
            Step::Invalid => Err(FetchError::invalid("records list missing")),
            Step::Empty => Ok(FetchedPage::new(
                PageResult::new(page, vec![])
                    .with_totals(Some(self.total_count), Some(self.hits_per_page)),
            )),
            Step::Ok => {
                let records = self
                    .ids_for(page)
                    .into_iter()
                    .map(|id| Record::with_id(id.clone(), json!({"lotNumber": id})))
                    .collect();
                let result = PageResult::new(page, records)
                    .with_totals(Some(self.total_count), Some(self.hits_per_page));
                let envelope = if self.send_ref_ids {
                    json!({"refId": format!("ref-{}", page), "totalCount": self.total_count})
                } else {
                    json!({"totalCount": self.total_count})
                };
                let mut cookies = BTreeMap::new();
                cookies.insert("sid".to_string(), format!("s{}", page));
                Ok(FetchedPage::new(result)
                    .with_envelope(envelope)
                    .with_cookies(cookies))
            }
        }
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(
        &self,
        page_number: u32,
        navigation: &NavigationState,
    ) -> Result<FetchedPage, FetchError> {
        self.seen
            .lock()
            .unwrap()
            .push((page_number, navigation.clone()));
        self.respond(page_number)
    }
}

#[async_trait]
impl InitialStateLoader for ScriptedFetcher {
    async fn load_first_page(&self, _job: &JobSpec) -> Result<SeedPage, FetchError> {
        let page = self.respond(1)?;
        let navigation = NavigationState {
            ref_id: self.send_ref_ids.then(|| "ref-seed".to_string()),
            cookies: page.cookies.clone(),
            ..Default::default()
        };
        Ok(SeedPage { page, navigation })
    }
}

/// Engine settings with fixed jitter so pacing is predictable.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        jitter_min: 1.0,
        jitter_max: 1.0,
        ..Default::default()
    }
}

pub fn manager(
    fetcher: Arc<ScriptedFetcher>,
    storage: &MemoryStorage,
    config: EngineConfig,
) -> (PaginationManager, mpsc::Receiver<HarvestEvent>) {
    let (tx, rx) = mpsc::channel(4096);
    let manager = PaginationManager::builder(fetcher.clone(), fetcher, Arc::new(storage.clone()))
        .config(config)
        .events(tx)
        .build()
        .unwrap();
    (manager, rx)
}

pub fn drain(rx: &mut mpsc::Receiver<HarvestEvent>) -> Vec<HarvestEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// `(page, delay)` of every wait of the given kind.
pub fn waits(events: &[HarvestEvent], kind: harvest::WaitReason) -> Vec<(u32, Duration)> {
    events
        .iter()
        .filter_map(|event| match event {
            HarvestEvent::Waiting {
                page,
                delay,
                reason,
                ..
            } if *reason == kind => Some((*page, *delay)),
            _ => None,
        })
        .collect()
}
