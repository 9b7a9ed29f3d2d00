//! Append-only audit trail with a per-reservation hash chain

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::error;
use uuid::Uuid;

use super::unit_of_work::UnitOfWork;
use crate::domain::reservation::normalize_code;
use crate::domain::{
    ChangeType, ChangedField, LedgerStore, NewChange, Reservation, ReservationChange,
    ReservationId,
};
use crate::shared::errors::{LedgerError, LedgerResult};
use crate::shared::time::{now_utc, to_canonical};

/// What a mutation hands to the trail.
pub struct AuditEntry<'a> {
    pub change_type: ChangeType,
    pub changed_fields: &'a [ChangedField],
    pub idempotency_key: &'a str,
    pub request_fingerprint: &'a str,
    pub call_id: Option<&'a str>,
    pub before: Option<&'a Reservation>,
    pub after: &'a Reservation,
}

#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn LedgerStore>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Append one change inside the mutation's unit of work.
    pub async fn record(
        &self,
        uow: &mut UnitOfWork,
        entry: AuditEntry<'_>,
    ) -> LedgerResult<ReservationChange> {
        let reservation_id = entry.after.reservation_id;
        let prev_hash = uow
            .tx()
            .last_change_for(reservation_id)
            .await?
            .map(|c| c.entry_hash);

        let mut change = NewChange {
            change_id: Uuid::new_v4(),
            reservation_id,
            change_type: entry.change_type,
            changed_fields: entry
                .changed_fields
                .iter()
                .map(|f| f.as_str().to_string())
                .collect(),
            idempotency_key: entry.idempotency_key.to_string(),
            request_fingerprint: entry.request_fingerprint.to_string(),
            call_id: entry.call_id.map(str::to_string),
            before_state: entry.before.map(Reservation::to_snapshot).transpose()?,
            after_state: entry.after.to_snapshot()?,
            prev_hash,
            entry_hash: String::new(),
            created_at: now_utc(),
        };
        change.entry_hash = entry_hash(&change);

        uow.tx().insert_change(change).await
    }

    /// Ordered by `seq`.
    pub async fn history(&self, reservation_id: ReservationId) -> LedgerResult<Vec<ReservationChange>> {
        self.store.changes_for(reservation_id).await
    }

    pub async fn history_for_code(&self, confirmation_code: &str) -> LedgerResult<Vec<ReservationChange>> {
        let code = normalize_code(confirmation_code);
        let reservation = self
            .store
            .reservation_by_code(&code)
            .await?
            .ok_or_else(|| LedgerError::not_found("Reservation", "confirmation_code", &code))?;
        self.history(reservation.reservation_id).await
    }

    /// Recompute the hash chain. Returns the number of verified entries.
    pub async fn verify(&self, reservation_id: ReservationId) -> LedgerResult<usize> {
        let history = self.history(reservation_id).await?;
        let mut prev: Option<String> = None;

        for change in &history {
            if change.prev_hash != prev {
                return Err(broken_chain(reservation_id, change.seq, "prev_hash mismatch"));
            }
            let recomputed = entry_hash(&NewChange {
                change_id: change.change_id,
                reservation_id: change.reservation_id,
                change_type: change.change_type,
                changed_fields: change.changed_fields.clone(),
                idempotency_key: change.idempotency_key.clone(),
                request_fingerprint: change.request_fingerprint.clone(),
                call_id: change.call_id.clone(),
                before_state: change.before_state.clone(),
                after_state: change.after_state.clone(),
                prev_hash: change.prev_hash.clone(),
                entry_hash: String::new(),
                created_at: change.created_at,
            });
            if recomputed != change.entry_hash {
                return Err(broken_chain(reservation_id, change.seq, "entry_hash mismatch"));
            }
            prev = Some(change.entry_hash.clone());
        }
        Ok(history.len())
    }
}

fn broken_chain(reservation_id: ReservationId, seq: i64, what: &str) -> LedgerError {
    error!(%reservation_id, seq, what, "Audit chain verification failed");
    LedgerError::InvariantViolation(format!(
        "audit chain for reservation {reservation_id} broken at seq {seq}: {what}"
    ))
}

pub fn entry_hash(change: &NewChange) -> String {
    let mut hasher = Sha256::new();
    let fields: [&str; 11] = [
        change.prev_hash.as_deref().unwrap_or(""),
        &change.change_id.to_string(),
        &change.reservation_id.to_string(),
        change.change_type.as_str(),
        &change.changed_fields.join(","),
        &change.idempotency_key,
        &change.request_fingerprint,
        change.call_id.as_deref().unwrap_or(""),
        change.before_state.as_deref().unwrap_or(""),
        &change.after_state,
        &to_canonical(&change.created_at),
    ];
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
}
