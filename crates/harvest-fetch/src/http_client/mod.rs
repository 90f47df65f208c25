//! HTTP client for JSON search APIs.
//!
//! Cookies are carried in the job's [`NavigationState`] rather than a shared
//! cookie jar, so concurrent jobs never see each other's sessions and a
//! resumed job picks its session back up from the checkpoint.

mod request;
mod response;
mod user_agent;

pub use request::{param_string, query_url, search_params};
pub use response::{
    classify_status, extract_path, is_rate_limited_status, parse_page, parse_set_cookie,
    response_cookies,
};
pub use user_agent::{random_user_agent, resolve_user_agent, IMPERSONATE_USER_AGENTS, USER_AGENT};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, RETRY_AFTER, SET_COOKIE};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use harvest::navigation::NavigationExtractor;
use harvest::rate_limit::parse_retry_after;
use harvest::{
    FetchError, FetchedPage, HttpMethod, InitialStateLoader, JobKey, JobSpec, NavigationState,
    PageFetcher, RecordIdentity, SearchApiConfig, SeedPage,
};

/// Longest `Retry-After` honored from a response.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(600);

/// Shared HTTP client for one search API.
#[derive(Clone)]
pub struct HttpSearchClient {
    client: Client,
    endpoint: Url,
    config: Arc<SearchApiConfig>,
    identity: RecordIdentity,
    extractor: NavigationExtractor,
}

/// Builder for constructing `HttpSearchClient`.
pub struct HttpSearchClientBuilder {
    config: SearchApiConfig,
    timeout: Duration,
    user_agent: Option<String>,
    identity: Option<RecordIdentity>,
    extractor: Option<NavigationExtractor>,
}

impl HttpSearchClientBuilder {
    /// Set the user agent string.
    /// - `"impersonate"`: Use random real browser user agent
    /// - Any other string: Use as-is
    /// - Not called: Use `search.user_agent`, else the default harvest user agent
    pub fn user_agent(mut self, ua: &str) -> Self {
        self.user_agent = Some(ua.to_string());
        self
    }

    /// Set how record ids are derived from payloads.
    pub fn identity(mut self, identity: RecordIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn extractor(mut self, extractor: NavigationExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Build the `HttpSearchClient`.
    ///
    /// # Errors
    /// Returns an error if the endpoint is not a valid URL or the underlying
    /// client cannot be created.
    pub fn build(self) -> Result<HttpSearchClient, String> {
        let endpoint = Url::parse(&self.config.endpoint)
            .map_err(|e| format!("Invalid search endpoint '{}': {}", self.config.endpoint, e))?;

        let user_agent = resolve_user_agent(
            self.user_agent
                .as_deref()
                .or(self.config.user_agent.as_deref()),
        );

        let client = Client::builder()
            .user_agent(user_agent.as_str())
            .timeout(self.timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        debug!("Search client for {} ({:?})", endpoint, self.config.method);

        Ok(HttpSearchClient {
            client,
            endpoint,
            identity: self.identity.unwrap_or_default(),
            extractor: self.extractor.unwrap_or_default(),
            config: Arc::new(self.config),
        })
    }
}

impl HttpSearchClient {
    pub fn builder(config: SearchApiConfig, timeout: Duration) -> HttpSearchClientBuilder {
        HttpSearchClientBuilder {
            config,
            timeout,
            user_agent: None,
            identity: None,
            extractor: None,
        }
    }

    pub fn config(&self) -> &SearchApiConfig {
        &self.config
    }

    /// A fetcher bound to one job.
    pub fn session(&self, job: JobKey) -> HttpSearchSession {
        HttpSearchSession {
            client: self.clone(),
            job,
        }
    }

    /// Fetch one result page.
    pub async fn search(
        &self,
        job: &JobKey,
        page_number: u32,
        navigation: &NavigationState,
    ) -> Result<FetchedPage, FetchError> {
        let params = search_params(&self.config, job, page_number, navigation);

        let mut request = match self.config.method {
            HttpMethod::Get => {
                let url = query_url(&self.endpoint, &params);
                debug!("[{}] GET page {}: {}", job, page_number, url);
                self.client.get(url)
            }
            HttpMethod::Post => {
                debug!("[{}] POST page {}: {}", job, page_number, self.endpoint);
                self.client
                    .post(self.endpoint.clone())
                    .json(&Value::Object(params))
            }
        };

        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = navigation.cookie_header() {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let retry_after = parse_retry_after(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            MAX_RETRY_AFTER,
        );
        let cookies = response_cookies(
            response
                .headers()
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok()),
        );
        let body = response.text().await.map_err(transport_error)?;

        if !(200..300).contains(&status) {
            let error = classify_status(&self.config, status, &body, retry_after);
            debug!("[{}] Page {} rejected: {}", job, page_number, error);
            return Err(error);
        }

        let (page, envelope) = parse_page(&self.config, &self.identity, page_number, &body)
            .map_err(|e| {
                let e = e.with_status(status);
                if e.is_rate_limited() {
                    debug!("[{}] Page {} throttled: {}", job, page_number, e);
                    e.with_retry_after(retry_after)
                } else {
                    e
                }
            })?;

        debug!(
            "[{}] Page {}: {} record(s), {} cookie(s) set",
            job,
            page_number,
            page.records.len(),
            cookies.len()
        );

        Ok(FetchedPage::new(page)
            .with_envelope(envelope)
            .with_cookies(cookies))
    }
}

fn transport_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::transport(format!("request timed out: {}", error))
    } else if error.is_connect() {
        FetchError::transport(format!("connection failed: {}", error))
    } else {
        FetchError::transport(error.to_string())
    }
}

/// Per-job view of an [`HttpSearchClient`].
#[derive(Clone)]
pub struct HttpSearchSession {
    client: HttpSearchClient,
    job: JobKey,
}

impl HttpSearchSession {
    pub fn job(&self) -> &JobKey {
        &self.job
    }
}

#[async_trait]
impl PageFetcher for HttpSearchSession {
    async fn fetch_page(
        &self,
        page_number: u32,
        navigation: &NavigationState,
    ) -> Result<FetchedPage, FetchError> {
        self.client.search(&self.job, page_number, navigation).await
    }
}

#[async_trait]
impl InitialStateLoader for HttpSearchSession {
    async fn load_first_page(&self, job: &JobSpec) -> Result<SeedPage, FetchError> {
        let page = self
            .client
            .search(&job.key, 1, &NavigationState::default())
            .await?;

        let mut navigation = NavigationState::default();
        let mut seed = page
            .envelope
            .as_ref()
            .map(|envelope| self.client.extractor.extract(envelope))
            .unwrap_or_default();
        seed.cookies.extend(page.cookies.clone());
        navigation.apply(seed);

        Ok(SeedPage { page, navigation })
    }
}
