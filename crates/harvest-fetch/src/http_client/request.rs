//! Search request parameters.

use serde_json::{Map, Value};
use url::Url;

use harvest::{JobKey, NavigationState, SearchApiConfig};

/// Parameters for one page request, keyed by upstream parameter name.
///
/// Navigation fields are included only once known. The search context keeps
/// its JSON shape so POST bodies can echo it verbatim.
pub fn search_params(
    config: &SearchApiConfig,
    job: &JobKey,
    page_number: u32,
    navigation: &NavigationState,
) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert(config.query_param.clone(), Value::from(job.query.clone()));
    if !job.category.is_empty() {
        params.insert(
            config.category_param.clone(),
            Value::from(job.category.clone()),
        );
    }
    params.insert(
        config.page_param.clone(),
        Value::from(config.upstream_page(page_number)),
    );
    if let Some(size) = config.page_size {
        params.insert(config.page_size_param.clone(), Value::from(size));
    }
    if let Some(ref ref_id) = navigation.ref_id {
        params.insert(config.ref_id_param.clone(), Value::from(ref_id.clone()));
    }
    if let Some(ref context) = navigation.search_context {
        params.insert(config.search_context_param.clone(), context.clone());
    }
    if let Some(ref token) = navigation.user_token {
        params.insert(config.user_token_param.clone(), Value::from(token.clone()));
    }
    params
}

/// Render a parameter for a query string.
pub fn param_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Endpoint with the parameters appended as query pairs.
pub fn query_url(endpoint: &Url, params: &Map<String, Value>) -> Url {
    let mut url = endpoint.clone();
    if !params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in params {
            pairs.append_pair(name, &param_string(value));
        }
    }
    url
}
