//! Contracts for the network-facing collaborators.
//!
//! The engine does not care whether pages come from a direct HTTP client, a
//! headless browser, or a DOM scrape. It needs one blocking round-trip per
//! page that yields either a parsed page or a [`FetchError`] classifiable
//! into one of three kinds.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{JobSpec, NavigationState, PageResult};

/// Classification of a failed round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// Timeout or connection failure.
    Transport,
    /// Explicit throttle signal (HTTP 429/503 or a provider message).
    RateLimited,
    /// Parseable but missing the expected record list.
    InvalidResponse,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transport => "transport error",
            Self::RateLimited => "rate limited",
            Self::InvalidResponse => "invalid response",
        })
    }
}

/// A failed page fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
    /// HTTP status, when the failure came with one.
    pub status: Option<u16>,
    /// Server-requested wait before retrying.
    pub retry_after: Option<Duration>,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transport, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::RateLimited, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::InvalidResponse, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == FetchErrorKind::RateLimited
    }
}

/// A successfully fetched page plus what the transport observed.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub result: PageResult,
    /// Raw response body, scanned for fresher navigation tokens.
    pub envelope: Option<serde_json::Value>,
    /// Cookies set by this round-trip.
    pub cookies: BTreeMap<String, String>,
}

impl FetchedPage {
    pub fn new(result: PageResult) -> Self {
        Self {
            result,
            envelope: None,
            cookies: BTreeMap::new(),
        }
    }

    pub fn with_envelope(mut self, envelope: serde_json::Value) -> Self {
        self.envelope = Some(envelope);
        self
    }

    pub fn with_cookies(mut self, cookies: BTreeMap<String, String>) -> Self {
        self.cookies = cookies;
        self
    }
}

/// First page of a job together with its seeded navigation state.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedPage {
    pub page: FetchedPage,
    pub navigation: NavigationState,
}

/// Performs one network round-trip per page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        page_number: u32,
        navigation: &NavigationState,
    ) -> Result<FetchedPage, FetchError>;
}

/// Loads the first page of a job and the initial continuation context.
#[async_trait]
pub trait InitialStateLoader: Send + Sync {
    async fn load_first_page(&self, job: &JobSpec) -> Result<SeedPage, FetchError>;
}
