//! Response classification and page parsing.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use harvest::{FetchError, PageResult, Record, RecordIdentity, SearchApiConfig};

/// Extract a value from nested JSON using dot-notation path.
pub fn extract_path<'a>(data: &'a Value, path: &str) -> &'a Value {
    if path.is_empty() {
        return data;
    }

    let mut current = data;
    for key in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(key).unwrap_or(&Value::Null),
            Value::Array(arr) => match key.parse::<usize>() {
                Ok(idx) => arr.get(idx).unwrap_or(&Value::Null),
                Err(_) => &Value::Null,
            },
            _ => &Value::Null,
        };
    }

    current
}

/// Read a count that may be sent as a number or a numeric string.
fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Check if the status indicates rate limiting (429 or 503).
pub fn is_rate_limited_status(status: u16) -> bool {
    status == 429 || status == 503
}

/// Classify a non-2xx response.
pub fn classify_status(
    config: &SearchApiConfig,
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> FetchError {
    let message = format!("HTTP {}", status);
    let error = if is_rate_limited_status(status) || config.has_rate_limit_marker(body) {
        FetchError::rate_limited(message).with_retry_after(retry_after)
    } else if status >= 500 {
        FetchError::transport(message)
    } else {
        FetchError::invalid(message)
    };
    error.with_status(status)
}

/// Interpret a 2xx body as a result page.
///
/// Returns the parsed page and the raw envelope for navigation extraction.
pub fn parse_page(
    config: &SearchApiConfig,
    identity: &RecordIdentity,
    page_number: u32,
    body: &str,
) -> Result<(PageResult, Value), FetchError> {
    let envelope: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) if config.has_rate_limit_marker(body) => {
            return Err(FetchError::rate_limited(format!(
                "blocked page instead of JSON ({})",
                e
            )))
        }
        Err(e) => return Err(FetchError::invalid(format!("response is not JSON: {}", e))),
    };

    let records = match extract_path(&envelope, &config.records_path) {
        Value::Array(items) => items
            .iter()
            .map(|payload| Record::new(payload.clone(), identity))
            .collect(),
        _ if config.has_rate_limit_marker(body) => {
            return Err(FetchError::rate_limited(format!(
                "throttled: no record list at '{}'",
                config.records_path
            )))
        }
        Value::Null => {
            return Err(FetchError::invalid(format!(
                "no record list at '{}'",
                config.records_path
            )))
        }
        _ => {
            return Err(FetchError::invalid(format!(
                "'{}' is not a list",
                config.records_path
            )))
        }
    };

    let total_count = as_count(extract_path(&envelope, &config.total_path));
    let hits_per_page = as_count(extract_path(&envelope, &config.hits_per_page_path))
        .and_then(|hits| u32::try_from(hits).ok());

    let page = PageResult::new(page_number, records).with_totals(total_count, hits_per_page);
    Ok((page, envelope))
}

/// Parse one `Set-Cookie` header into `(name, value)`.
///
/// Attributes after the first `;` are ignored.
pub fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().trim_matches('"').to_string()))
}

/// Collect cookies set by a response.
pub fn response_cookies<'a>(headers: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, String> {
    headers.into_iter().filter_map(parse_set_cookie).collect()
}
