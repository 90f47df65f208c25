//! Harvested records.

use serde::{Deserialize, Serialize};

use crate::identity::RecordIdentity;

/// One harvested item.
///
/// The payload is stored exactly as received; only `id` is interpreted.
/// Two records with the same `id` are duplicates regardless of payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub payload: serde_json::Value,
}

impl Record {
    /// Build a record, deriving its id from the payload.
    pub fn new(payload: serde_json::Value, identity: &RecordIdentity) -> Self {
        Self {
            id: identity.key_for(&payload),
            payload,
        }
    }

    /// Build a record with an explicit id.
    pub fn with_id(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}
