//! Session continuation context carried between page requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Continuation context the upstream expects on every follow-up request.
///
/// Refreshed after each successful fetch; values are only ever replaced by
/// fresher ones, never rolled back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationState {
    /// Continuation token (`refId` or equivalent).
    pub ref_id: Option<String>,
    /// Opaque search context echoed back to the upstream.
    pub search_context: Option<serde_json::Value>,
    pub user_token: Option<String>,
    /// Session cookies by name.
    pub cookies: BTreeMap<String, String>,
}

/// Freshly extracted navigation values. Absent fields keep the prior value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialNavigationState {
    pub ref_id: Option<String>,
    pub search_context: Option<serde_json::Value>,
    pub user_token: Option<String>,
    pub cookies: BTreeMap<String, String>,
}

impl PartialNavigationState {
    pub fn is_empty(&self) -> bool {
        self.ref_id.is_none()
            && self.search_context.is_none()
            && self.user_token.is_none()
            && self.cookies.is_empty()
    }

    /// Layer `other` on top of `self`; values in `other` win.
    pub fn merge(mut self, other: PartialNavigationState) -> Self {
        if other.ref_id.is_some() {
            self.ref_id = other.ref_id;
        }
        if other.search_context.is_some() {
            self.search_context = other.search_context;
        }
        if other.user_token.is_some() {
            self.user_token = other.user_token;
        }
        self.cookies.extend(other.cookies);
        self
    }
}

impl NavigationState {
    /// Apply fresher values. Returns true if anything changed.
    pub fn apply(&mut self, update: PartialNavigationState) -> bool {
        let mut changed = false;

        if let Some(ref_id) = update.ref_id {
            if self.ref_id.as_deref() != Some(ref_id.as_str()) {
                self.ref_id = Some(ref_id);
                changed = true;
            }
        }
        if let Some(context) = update.search_context {
            if self.search_context.as_ref() != Some(&context) {
                self.search_context = Some(context);
                changed = true;
            }
        }
        if let Some(token) = update.user_token {
            if self.user_token.as_deref() != Some(token.as_str()) {
                self.user_token = Some(token);
                changed = true;
            }
        }
        for (name, value) in update.cookies {
            if self.cookies.get(&name) != Some(&value) {
                self.cookies.insert(name, value);
                changed = true;
            }
        }

        changed
    }

    /// Whether a continuation token is available.
    ///
    /// Without one, pagination degrades to page-number-only addressing.
    pub fn has_continuation(&self) -> bool {
        self.ref_id.is_some()
    }

    /// Render cookies as a `Cookie` request header value.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_keeps_prior_values_when_absent() {
        let mut nav = NavigationState {
            ref_id: Some("r1".into()),
            user_token: Some("u1".into()),
            ..Default::default()
        };

        let changed = nav.apply(PartialNavigationState {
            search_context: Some(json!({"sort": "date"})),
            ..Default::default()
        });

        assert!(changed);
        assert_eq!(nav.ref_id.as_deref(), Some("r1"));
        assert_eq!(nav.user_token.as_deref(), Some("u1"));
        assert_eq!(nav.search_context, Some(json!({"sort": "date"})));
    }

    #[test]
    fn test_apply_same_values_is_unchanged() {
        let mut nav = NavigationState {
            ref_id: Some("r1".into()),
            ..Default::default()
        };
        let changed = nav.apply(PartialNavigationState {
            ref_id: Some("r1".into()),
            ..Default::default()
        });
        assert!(!changed);
    }

    #[test]
    fn test_cookies_merge_by_name() {
        let mut nav = NavigationState::default();
        nav.cookies.insert("sid".into(), "old".into());
        nav.cookies.insert("lang".into(), "en".into());

        let mut cookies = BTreeMap::new();
        cookies.insert("sid".into(), "new".into());
        nav.apply(PartialNavigationState {
            cookies,
            ..Default::default()
        });

        assert_eq!(nav.cookie_header().as_deref(), Some("lang=en; sid=new"));
    }

    #[test]
    fn test_partial_merge_prefers_other() {
        let base = PartialNavigationState {
            ref_id: Some("body".into()),
            user_token: Some("t".into()),
            ..Default::default()
        };
        let merged = base.merge(PartialNavigationState {
            ref_id: Some("header".into()),
            ..Default::default()
        });
        assert_eq!(merged.ref_id.as_deref(), Some("header"));
        assert_eq!(merged.user_token.as_deref(), Some("t"));
    }
}
