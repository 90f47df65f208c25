//! Record identity: how a harvested record's dedup key is derived.
//!
//! The provider-assigned lot identifier is the primary key. Records that
//! carry none fall back to a structural hash of the whole payload, taken
//! over a canonical (key-sorted) JSON rendering so the hash does not depend
//! on field order.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::IdentityConfig;

/// Prefix marking identities derived from a payload hash.
pub const HASH_PREFIX: &str = "sha256:";

/// Derives record identity keys from payloads.
#[derive(Debug, Clone)]
pub struct RecordIdentity {
    id_fields: Vec<String>,
}

impl Default for RecordIdentity {
    fn default() -> Self {
        Self::from_config(&IdentityConfig::default())
    }
}

impl RecordIdentity {
    pub fn new(id_fields: Vec<String>) -> Self {
        Self { id_fields }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(config.id_fields.clone())
    }

    /// Compute the identity key for a payload.
    pub fn key_for(&self, payload: &Value) -> String {
        self.provider_id(payload)
            .unwrap_or_else(|| structural_hash(payload))
    }

    /// Look up the first configured id field that holds a usable value.
    ///
    /// Field names may be dotted paths into nested objects.
    pub fn provider_id(&self, payload: &Value) -> Option<String> {
        self.id_fields.iter().find_map(|field| {
            let mut current = payload;
            for segment in field.split('.') {
                current = current.get(segment)?;
            }
            match current {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        })
    }
}

/// Deterministic hash of a payload, independent of object key order.
pub fn structural_hash(payload: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(payload, &mut canonical);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{}{}", HASH_PREFIX, hex::encode(hasher.finalize()))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_id_from_string_and_number() {
        let identity = RecordIdentity::new(vec!["lotNumber".into()]);
        assert_eq!(identity.key_for(&json!({"lotNumber": "A-17"})), "A-17");
        assert_eq!(identity.key_for(&json!({"lotNumber": 4412})), "4412");
    }

    #[test]
    fn test_provider_id_field_order_wins() {
        let identity = RecordIdentity::new(vec!["ln".into(), "id".into()]);
        let payload = json!({"id": "second", "ln": "first"});
        assert_eq!(identity.key_for(&payload), "first");
    }

    #[test]
    fn test_nested_provider_id() {
        let identity = RecordIdentity::new(vec!["lot.number".into()]);
        assert_eq!(identity.key_for(&json!({"lot": {"number": 9}})), "9");
    }

    #[test]
    fn test_blank_id_falls_back_to_hash() {
        let identity = RecordIdentity::new(vec!["lotNumber".into()]);
        let key = identity.key_for(&json!({"lotNumber": "  ", "make": "FORD"}));
        assert!(key.starts_with(HASH_PREFIX));
    }

    #[test]
    fn test_structural_hash_ignores_key_order() {
        let a = json!({"make": "FORD", "year": 2019, "tags": [1, 2]});
        let b = json!({"tags": [1, 2], "year": 2019, "make": "FORD"});
        assert_eq!(structural_hash(&a), structural_hash(&b));
        assert_ne!(structural_hash(&a), structural_hash(&json!({"make": "FORD"})));
    }
}
