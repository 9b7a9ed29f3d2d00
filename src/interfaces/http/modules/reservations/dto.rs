//! Audit history DTOs

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::ReservationChange;

#[derive(Debug, Serialize, ToSchema)]
pub struct ChangeDto {
    pub seq: i64,
    pub change_id: Uuid,
    /// CREATE, UPDATE_TIME, UPDATE_PARTY_SIZE, UPDATE_TYPE or CANCEL
    pub change_type: String,
    pub changed_fields: Vec<String>,
    pub idempotency_key: String,
    pub request_fingerprint: String,
    /// Call that produced this entry
    pub call_id: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub before_state: Option<serde_json::Value>,
    #[schema(value_type = Object)]
    pub after_state: serde_json::Value,
    pub prev_hash: Option<String>,
    pub entry_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Snapshots are stored as JSON text; anything unparsable is passed through
/// as a string rather than hidden.
fn snapshot(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

impl From<ReservationChange> for ChangeDto {
    fn from(c: ReservationChange) -> Self {
        Self {
            seq: c.seq,
            change_id: c.change_id,
            change_type: c.change_type.as_str().to_string(),
            changed_fields: c.changed_fields,
            idempotency_key: c.idempotency_key,
            request_fingerprint: c.request_fingerprint,
            call_id: c.call_id,
            before_state: c.before_state.as_deref().map(snapshot),
            after_state: snapshot(&c.after_state),
            prev_hash: c.prev_hash,
            entry_hash: c.entry_hash,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    pub confirmation_code: String,
    /// Oldest first
    pub changes: Vec<ChangeDto>,
    /// Whether the hash chain recomputes cleanly
    pub chain_valid: bool,
}
