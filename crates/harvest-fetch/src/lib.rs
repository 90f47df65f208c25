//! harvest-fetch - HTTP transport for JSON search APIs.
//!
//! Implements the [`harvest::PageFetcher`] and [`harvest::InitialStateLoader`]
//! collaborators over reqwest. One [`HttpSearchClient`] is shared across
//! jobs; each job gets its own [`HttpSearchSession`].

pub mod http_client;

pub use http_client::{
    resolve_user_agent, HttpSearchClient, HttpSearchClientBuilder, HttpSearchSession,
    IMPERSONATE_USER_AGENTS, USER_AGENT,
};
