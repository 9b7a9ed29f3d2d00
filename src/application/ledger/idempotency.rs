//! Duplicate request detection keyed by caller-supplied idempotency keys
//!
//! A key is bound to the first change committed with it. Replaying the key
//! returns that change's `after_state`; replaying it with a different payload
//! is refused. The unique index on `reservation_changes.idempotency_key` is
//! the final arbiter when two requests race past both checks.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::unit_of_work::UnitOfWork;
use crate::domain::{LedgerStore, Reservation, ReservationChange};
use crate::shared::errors::{LedgerError, LedgerResult};

const MAX_KEY_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    AlreadyProcessed(Reservation),
    Proceed,
}

pub fn validate_key(idempotency_key: &str) -> LedgerResult<()> {
    if idempotency_key.trim().is_empty() {
        return Err(LedgerError::Validation("idempotency_key is required".into()));
    }
    if idempotency_key.len() > MAX_KEY_LEN {
        return Err(LedgerError::Validation(format!(
            "idempotency_key longer than {MAX_KEY_LEN} bytes"
        )));
    }
    Ok(())
}

/// SHA-256 over the operation name and the canonical JSON of its payload.
/// The payload must not contain the idempotency key itself.
pub fn fingerprint<T: Serialize>(operation: &str, payload: &T) -> LedgerResult<String> {
    let value = serde_json::to_value(payload)
        .map_err(|e| LedgerError::Validation(format!("unserializable request: {e}")))?;
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_json(&value).as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// JSON text with object keys sorted at every level.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn LedgerStore>,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Fast path, outside any transaction.
    pub async fn check_or_reserve(
        &self,
        idempotency_key: &str,
        fingerprint: &str,
    ) -> LedgerResult<GuardDecision> {
        let existing = self.store.change_by_key(idempotency_key).await?;
        decide(existing, idempotency_key, fingerprint)
    }

    /// Serialized path, after the unit of work holds its slot locks.
    pub async fn check_locked(
        &self,
        uow: &mut UnitOfWork,
        idempotency_key: &str,
        fingerprint: &str,
    ) -> LedgerResult<GuardDecision> {
        let existing = uow.tx().change_by_key(idempotency_key).await?;
        decide(existing, idempotency_key, fingerprint)
    }

    /// Called after losing a race on the unique index: the winner has
    /// committed, so its change is readable now.
    pub async fn resolve_conflict(
        &self,
        idempotency_key: &str,
        fingerprint: &str,
    ) -> LedgerResult<Reservation> {
        debug!(idempotency_key, "Resolving idempotency key conflict");
        match self.check_or_reserve(idempotency_key, fingerprint).await? {
            GuardDecision::AlreadyProcessed(reservation) => Ok(reservation),
            GuardDecision::Proceed => Err(LedgerError::StaleWrite(format!(
                "idempotency key {idempotency_key} conflicted but no change is visible"
            ))),
        }
    }
}

fn decide(
    existing: Option<ReservationChange>,
    idempotency_key: &str,
    fingerprint: &str,
) -> LedgerResult<GuardDecision> {
    let Some(change) = existing else {
        return Ok(GuardDecision::Proceed);
    };
    if change.request_fingerprint != fingerprint {
        warn!(idempotency_key, "Idempotency key reused with a different payload");
        return Err(LedgerError::IdempotencyKeyReused(idempotency_key.to_string()));
    }
    Ok(GuardDecision::AlreadyProcessed(Reservation::from_snapshot(
        &change.after_state,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_ignores_key_order() {
        let a = fingerprint("book", &json!({"a": 1, "b": {"y": 2, "x": [1, 2]}})).unwrap();
        let b = fingerprint("book", &json!({"b": {"x": [1, 2], "y": 2}, "a": 1})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_depends_on_operation_and_payload() {
        let payload = json!({"confirmation_code": "RES-AAAAAA"});
        assert_ne!(
            fingerprint("cancel", &payload).unwrap(),
            fingerprint("modify", &payload).unwrap()
        );
        assert_ne!(
            fingerprint("cancel", &payload).unwrap(),
            fingerprint("cancel", &json!({"confirmation_code": "RES-BBBBBB"})).unwrap()
        );
    }

    #[test]
    fn canonical_json_escapes_keys() {
        assert_eq!(canonical_json(&json!({"b\"": 1, "a": null})), r#"{"a":null,"b\"":1}"#);
    }

    #[test]
    fn key_validation() {
        assert!(validate_key("call-1:book").is_ok());
        assert!(validate_key("  ").is_err());
        assert!(validate_key(&"k".repeat(129)).is_err());
    }
}
