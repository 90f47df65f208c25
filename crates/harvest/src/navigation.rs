//! Navigation state extraction.
//!
//! The upstream moves its continuation fields around between response
//! variants, so each field is looked up through an ordered fallback chain,
//! first match wins:
//!
//! 1. a top-level field on the response,
//! 2. inside a request-echo block (`request`, `requestEcho`, `searchRequest`),
//! 3. inside a metadata block (`metadata`, `meta`),
//! 4. a depth-bounded scan of the whole object graph.
//!
//! Nothing found means an empty [`PartialNavigationState`]; the caller keeps
//! its prior values and carries on.

use serde_json::{Map, Value};

use crate::models::PartialNavigationState;

/// Recognized names for the continuation token.
pub const REF_ID_FIELDS: &[&str] = &["refId", "ref_id", "refid", "continuationToken", "cursor"];

/// Recognized names for the opaque search context.
pub const SEARCH_CONTEXT_FIELDS: &[&str] = &["searchContext", "search_context"];

/// Recognized names for the user token.
pub const USER_TOKEN_FIELDS: &[&str] = &["userToken", "user_token"];

/// Blocks that echo the originating request.
pub const REQUEST_ECHO_BLOCKS: &[&str] = &["request", "requestEcho", "searchRequest"];

/// Blocks carrying response metadata.
pub const METADATA_BLOCKS: &[&str] = &["metadata", "meta"];

/// Default bound for the recursive scan.
pub const MAX_SCAN_DEPTH: usize = 8;

/// Extracts continuation context from raw responses.
#[derive(Debug, Clone)]
pub struct NavigationExtractor {
    max_depth: usize,
}

impl Default for NavigationExtractor {
    fn default() -> Self {
        Self::new(MAX_SCAN_DEPTH)
    }
}

impl NavigationExtractor {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Pull whatever navigation fields the response carries.
    ///
    /// Cookies come from the transport, never from the body, so the result's
    /// cookie map is always empty.
    pub fn extract(&self, response: &Value) -> PartialNavigationState {
        PartialNavigationState {
            ref_id: self.find(response, REF_ID_FIELDS, token_string),
            search_context: self.find(response, SEARCH_CONTEXT_FIELDS, context_value),
            user_token: self.find(response, USER_TOKEN_FIELDS, token_string),
            ..Default::default()
        }
    }

    fn find<T>(&self, response: &Value, names: &[&str], accept: fn(&Value) -> Option<T>) -> Option<T> {
        let root = response.as_object()?;

        if let Some(found) = field(root, names, accept) {
            return Some(found);
        }

        for blocks in [REQUEST_ECHO_BLOCKS, METADATA_BLOCKS] {
            let found = blocks
                .iter()
                .filter_map(|block| root.get(*block).and_then(Value::as_object))
                .find_map(|block| field(block, names, accept));
            if found.is_some() {
                return found;
            }
        }

        scan(response, names, accept, self.max_depth)
    }
}

/// Extract with the default scan depth.
pub fn extract(response: &Value) -> PartialNavigationState {
    NavigationExtractor::default().extract(response)
}

fn field<T>(object: &Map<String, Value>, names: &[&str], accept: fn(&Value) -> Option<T>) -> Option<T> {
    names
        .iter()
        .filter_map(|name| object.get(*name))
        .find_map(accept)
}

fn scan<T>(value: &Value, names: &[&str], accept: fn(&Value) -> Option<T>, depth: usize) -> Option<T> {
    match value {
        Value::Object(map) => {
            if let Some(found) = field(map, names, accept) {
                return Some(found);
            }
            if depth == 0 {
                return None;
            }
            map.values().find_map(|child| scan(child, names, accept, depth - 1))
        }
        Value::Array(items) if depth > 0 => items
            .iter()
            .find_map(|child| scan(child, names, accept, depth - 1)),
        _ => None,
    }
}

fn token_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn context_value(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        other => Some(other.clone()),
    }
}
