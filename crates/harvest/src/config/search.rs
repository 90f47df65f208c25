//! Upstream search API description.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// HTTP method used for search requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    /// Parameters are sent as a JSON body.
    Post,
}

/// How to talk to the upstream search API (`[search]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchApiConfig {
    /// Search endpoint URL.
    pub endpoint: String,
    pub method: HttpMethod,
    pub query_param: String,
    pub category_param: String,
    pub page_param: String,
    pub page_size_param: String,
    /// Requested page size; omitted from requests when unset.
    pub page_size: Option<u32>,
    /// Whether the upstream numbers pages from zero.
    pub zero_based_pages: bool,
    /// Dotted path to the record list in the response.
    pub records_path: String,
    /// Dotted path to the total result count.
    pub total_path: String,
    /// Dotted path to the page size reported by the upstream.
    pub hits_per_page_path: String,
    pub ref_id_param: String,
    pub search_context_param: String,
    pub user_token_param: String,
    /// Case-insensitive body fragments that mean "throttled".
    pub rate_limit_markers: Vec<String>,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// User agent; `"impersonate"` picks a real browser user agent.
    pub user_agent: Option<String>,
}

impl Default for SearchApiConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            method: HttpMethod::Get,
            query_param: "query".to_string(),
            category_param: "category".to_string(),
            page_param: "page".to_string(),
            page_size_param: "size".to_string(),
            page_size: None,
            zero_based_pages: false,
            records_path: "results".to_string(),
            total_path: "totalCount".to_string(),
            hits_per_page_path: "hitsPerPage".to_string(),
            ref_id_param: "refId".to_string(),
            search_context_param: "searchContext".to_string(),
            user_token_param: "userToken".to_string(),
            rate_limit_markers: vec![
                "too many requests".to_string(),
                "rate limit".to_string(),
                "request was blocked".to_string(),
            ],
            headers: BTreeMap::new(),
            user_agent: None,
        }
    }
}

impl SearchApiConfig {
    /// Page number as sent upstream.
    pub fn upstream_page(&self, page_number: u32) -> u32 {
        if self.zero_based_pages {
            page_number.saturating_sub(1)
        } else {
            page_number
        }
    }

    /// Whether a response body carries a throttling message.
    pub fn has_rate_limit_marker(&self, body: &str) -> bool {
        let body = body.to_lowercase();
        self.rate_limit_markers
            .iter()
            .any(|marker| !marker.is_empty() && body.contains(&marker.to_lowercase()))
    }
}
