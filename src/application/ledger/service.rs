//! Reservation ledger
//!
//! Every mutation runs as one unit of work: idempotency check, slot locks
//! taken in ascending id order, capacity check, reservation write, audit
//! entry, commit. Every exit path commits or rolls back explicitly.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::audit::{AuditEntry, AuditTrail};
use super::idempotency::{fingerprint, validate_key, GuardDecision, IdempotencyGuard};
use super::slots::SlotRepository;
use super::unit_of_work::UnitOfWork;
use crate::domain::reservation::{
    normalize_code, validate_holes, validate_party_size, ConfirmationCodeGenerator,
};
use crate::domain::{
    ChangeType, ChangedField, Contact, LedgerStore, Reservation, ReservationChange,
    ReservationChanges, ReservationStatus, RoundType, SlotId, SlotTarget,
};
use crate::shared::errors::{LedgerError, LedgerResult};
use crate::shared::time::now_utc;

const CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub max_party_size: i32,
    pub confirmation_prefix: String,
    /// Internal retries on stale reads and code collisions.
    pub max_attempts: u32,
    pub read_only: bool,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            max_party_size: 4,
            confirmation_prefix: "RES".to_string(),
            max_attempts: 3,
            read_only: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookRequest {
    pub slot_id: SlotId,
    pub party_size: i32,
    pub round_type: RoundType,
    pub holes: i32,
    pub contact: Option<Contact>,
    #[serde(skip)]
    pub idempotency_key: String,
    /// Attribution only; replays with another call id still match.
    #[serde(skip)]
    pub call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModifyRequest {
    pub confirmation_code: String,
    pub changes: ReservationChanges,
    #[serde(skip)]
    pub idempotency_key: String,
    #[serde(skip)]
    pub call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelRequest {
    pub confirmation_code: String,
    #[serde(skip)]
    pub idempotency_key: String,
    #[serde(skip)]
    pub call_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// This call committed a change.
    Committed,
    /// The idempotency key was already processed; the stored result is returned.
    Replayed,
    /// Nothing to do; current state returned, nothing recorded.
    Unchanged,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Replayed => "replayed",
            Self::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationResult {
    pub reservation: Reservation,
    pub outcome: Outcome,
}

/// Read-only answer to "could this reservation be changed like that?"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeQuote {
    pub can_change: bool,
    pub reason: Option<String>,
    pub capacity_ok: bool,
    pub target_slot_id: Option<SlotId>,
    pub target_start_time: Option<DateTime<Utc>>,
}

impl ChangeQuote {
    fn refused(reason: impl Into<String>) -> Self {
        Self {
            can_change: false,
            reason: Some(reason.into()),
            capacity_ok: false,
            target_slot_id: None,
            target_start_time: None,
        }
    }
}

/// Result of one attempt inside a unit of work.
enum Step {
    Apply(Reservation),
    Replay(Reservation),
    Unchanged(Reservation),
    Retry(&'static str),
}

enum Settled {
    Done(MutationResult),
    Again(String),
}

pub struct ReservationLedger {
    store: Arc<dyn LedgerStore>,
    slots: SlotRepository,
    guard: IdempotencyGuard,
    audit: AuditTrail,
    codes: ConfirmationCodeGenerator,
    settings: LedgerSettings,
}

impl ReservationLedger {
    pub fn new(store: Arc<dyn LedgerStore>, settings: LedgerSettings) -> Self {
        Self {
            slots: SlotRepository::new(store.clone()),
            guard: IdempotencyGuard::new(store.clone()),
            audit: AuditTrail::new(store.clone()),
            codes: ConfirmationCodeGenerator::new(settings.confirmation_prefix.clone()),
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn slots(&self) -> &SlotRepository {
        &self.slots
    }

    // ── Mutations ───────────────────────────────────────────────

    pub async fn book(&self, request: BookRequest) -> LedgerResult<MutationResult> {
        let start = Instant::now();
        let result = self.book_inner(&request).await;
        record_outcome("book", &result, start);
        result
    }

    pub async fn modify(&self, request: ModifyRequest) -> LedgerResult<MutationResult> {
        let start = Instant::now();
        let result = self.modify_inner(&request).await;
        record_outcome("modify", &result, start);
        result
    }

    pub async fn cancel(&self, request: CancelRequest) -> LedgerResult<MutationResult> {
        let start = Instant::now();
        let result = self.cancel_inner(&request).await;
        record_outcome("cancel", &result, start);
        result
    }

    async fn book_inner(&self, request: &BookRequest) -> LedgerResult<MutationResult> {
        self.ensure_writable()?;
        validate_key(&request.idempotency_key)?;
        validate_party_size(request.party_size, self.settings.max_party_size)?;
        validate_holes(request.holes)?;
        if let Some(contact) = &request.contact {
            contact.validate()?;
        }
        let key = request.idempotency_key.as_str();
        let fp = fingerprint("book", request)?;

        if let GuardDecision::AlreadyProcessed(r) = self.guard.check_or_reserve(key, &fp).await? {
            return Ok(replayed(r));
        }

        for attempt in 1..=self.settings.max_attempts {
            let mut uow = UnitOfWork::begin(self.store.as_ref()).await?;
            let step = self.book_step(&mut uow, request, &fp).await;
            match self.settle(uow, step, key, &fp).await? {
                Settled::Done(result) => {
                    if result.outcome == Outcome::Committed {
                        info!(
                            code = %result.reservation.confirmation_code,
                            slot_id = %request.slot_id,
                            party_size = request.party_size,
                            "⛳ Reservation booked"
                        );
                    }
                    return Ok(result);
                }
                Settled::Again(reason) => debug!(attempt, reason = %reason, "Retrying book"),
            }
        }
        Err(self.exhausted("book"))
    }

    async fn book_step(
        &self,
        uow: &mut UnitOfWork,
        request: &BookRequest,
        fp: &str,
    ) -> LedgerResult<Step> {
        let key = request.idempotency_key.as_str();
        self.slots.lock_slot(uow, request.slot_id).await?;
        if let GuardDecision::AlreadyProcessed(r) = self.guard.check_locked(uow, key, fp).await? {
            return Ok(Step::Replay(r));
        }

        self.slots
            .apply_delta(uow, request.slot_id, request.party_size)
            .await?;

        let customer_id = match &request.contact {
            Some(contact) => Some(uow.tx().upsert_customer(contact).await?),
            None => None,
        };
        let confirmation_code = self.unique_code(uow).await?;
        let now = now_utc();
        let reservation = Reservation {
            reservation_id: Uuid::new_v4(),
            confirmation_code,
            slot_id: request.slot_id,
            customer_id,
            party_size: request.party_size,
            round_type: request.round_type,
            holes: request.holes,
            status: ReservationStatus::Booked,
            version: 1,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            created_by_call_id: request.call_id.clone(),
            updated_by_call_id: request.call_id.clone(),
        };
        uow.tx().insert_reservation(&reservation).await?;

        self.audit
            .record(
                uow,
                AuditEntry {
                    change_type: ChangeType::Create,
                    changed_fields: &[],
                    idempotency_key: key,
                    request_fingerprint: fp,
                    call_id: request.call_id.as_deref(),
                    before: None,
                    after: &reservation,
                },
            )
            .await?;
        Ok(Step::Apply(reservation))
    }

    async fn modify_inner(&self, request: &ModifyRequest) -> LedgerResult<MutationResult> {
        self.ensure_writable()?;
        validate_key(&request.idempotency_key)?;
        if let Some(party_size) = request.changes.party_size {
            validate_party_size(party_size, self.settings.max_party_size)?;
        }
        let code = normalize_code(&request.confirmation_code);
        let key = request.idempotency_key.as_str();
        let fp = fingerprint(
            "modify",
            &json!({ "confirmation_code": code, "changes": request.changes }),
        )?;

        if let GuardDecision::AlreadyProcessed(r) = self.guard.check_or_reserve(key, &fp).await? {
            return Ok(replayed(r));
        }

        for attempt in 1..=self.settings.max_attempts {
            let peeked = self.find_reservation(&code).await?;
            if peeked.is_cancelled() {
                return Err(LedgerError::AlreadyCancelled(code));
            }
            let target = self.resolve_target(&peeked, request.changes.target).await?;

            let mut uow = UnitOfWork::begin(self.store.as_ref()).await?;
            let step = self
                .modify_step(&mut uow, &peeked, target, request, &fp)
                .await;
            match self.settle(uow, step, key, &fp).await? {
                Settled::Done(result) => {
                    if result.outcome == Outcome::Committed {
                        info!(
                            code = %code,
                            slot_id = %result.reservation.slot_id,
                            party_size = result.reservation.party_size,
                            version = result.reservation.version,
                            "Reservation modified"
                        );
                    }
                    return Ok(result);
                }
                Settled::Again(reason) => debug!(attempt, reason = %reason, "Retrying modify"),
            }
        }
        Err(self.exhausted("modify"))
    }

    async fn modify_step(
        &self,
        uow: &mut UnitOfWork,
        peeked: &Reservation,
        target: SlotId,
        request: &ModifyRequest,
        fp: &str,
    ) -> LedgerResult<Step> {
        let key = request.idempotency_key.as_str();
        let changes = &request.changes;
        self.slots
            .lock_slots(uow, &[peeked.slot_id, target])
            .await?;
        if let GuardDecision::AlreadyProcessed(r) = self.guard.check_locked(uow, key, fp).await? {
            return Ok(Step::Replay(r));
        }

        let current = uow
            .tx()
            .reservation_by_code(&peeked.confirmation_code)
            .await?
            .ok_or_else(|| {
                LedgerError::not_found("Reservation", "confirmation_code", &peeked.confirmation_code)
            })?;
        if current.slot_id != peeked.slot_id {
            return Ok(Step::Retry("reservation moved before its slot was locked"));
        }
        if current.is_cancelled() {
            return Err(LedgerError::AlreadyCancelled(current.confirmation_code));
        }

        let party_size = changes.party_size_or(&current);
        let round_type = changes.round_type_or(&current);

        let mut fields = Vec::new();
        if target != current.slot_id {
            fields.push(ChangedField::Time);
        }
        if party_size != current.party_size {
            fields.push(ChangedField::PartySize);
        }
        if round_type != current.round_type {
            fields.push(ChangedField::RoundType);
        }
        let Some(change_type) = ChangedField::change_type(&fields) else {
            return Ok(Step::Unchanged(current));
        };

        if target != current.slot_id {
            // Claim the target first so a full target leaves the source untouched.
            self.slots.apply_delta(uow, target, party_size).await?;
            self.slots
                .apply_delta(uow, current.slot_id, -current.party_size)
                .await?;
        } else if party_size != current.party_size {
            self.slots
                .apply_delta(uow, current.slot_id, party_size - current.party_size)
                .await?;
        }

        let updated = Reservation {
            slot_id: target,
            party_size,
            round_type,
            version: current.version + 1,
            updated_at: now_utc(),
            updated_by_call_id: request.call_id.clone(),
            ..current.clone()
        };
        uow.tx().update_reservation(&updated, current.version).await?;

        self.audit
            .record(
                uow,
                AuditEntry {
                    change_type,
                    changed_fields: &fields,
                    idempotency_key: key,
                    request_fingerprint: fp,
                    call_id: request.call_id.as_deref(),
                    before: Some(&current),
                    after: &updated,
                },
            )
            .await?;
        Ok(Step::Apply(updated))
    }

    async fn cancel_inner(&self, request: &CancelRequest) -> LedgerResult<MutationResult> {
        self.ensure_writable()?;
        validate_key(&request.idempotency_key)?;
        let code = normalize_code(&request.confirmation_code);
        let key = request.idempotency_key.as_str();
        let fp = fingerprint("cancel", &json!({ "confirmation_code": code }))?;

        if let GuardDecision::AlreadyProcessed(r) = self.guard.check_or_reserve(key, &fp).await? {
            return Ok(replayed(r));
        }

        for attempt in 1..=self.settings.max_attempts {
            let peeked = self.find_reservation(&code).await?;
            if peeked.is_cancelled() {
                return Ok(MutationResult {
                    reservation: peeked,
                    outcome: Outcome::Unchanged,
                });
            }

            let mut uow = UnitOfWork::begin(self.store.as_ref()).await?;
            let step = self.cancel_step(&mut uow, &peeked, request, &fp).await;
            match self.settle(uow, step, key, &fp).await? {
                Settled::Done(result) => {
                    if result.outcome == Outcome::Committed {
                        info!(
                            code = %code,
                            released = result.reservation.party_size,
                            "Reservation cancelled"
                        );
                    }
                    return Ok(result);
                }
                Settled::Again(reason) => debug!(attempt, reason = %reason, "Retrying cancel"),
            }
        }
        Err(self.exhausted("cancel"))
    }

    async fn cancel_step(
        &self,
        uow: &mut UnitOfWork,
        peeked: &Reservation,
        request: &CancelRequest,
        fp: &str,
    ) -> LedgerResult<Step> {
        let key = request.idempotency_key.as_str();
        self.slots.lock_slot(uow, peeked.slot_id).await?;
        if let GuardDecision::AlreadyProcessed(r) = self.guard.check_locked(uow, key, fp).await? {
            return Ok(Step::Replay(r));
        }

        let current = uow
            .tx()
            .reservation_by_code(&peeked.confirmation_code)
            .await?
            .ok_or_else(|| {
                LedgerError::not_found("Reservation", "confirmation_code", &peeked.confirmation_code)
            })?;
        if current.slot_id != peeked.slot_id {
            return Ok(Step::Retry("reservation moved before its slot was locked"));
        }
        if current.is_cancelled() {
            return Ok(Step::Unchanged(current));
        }

        self.slots
            .apply_delta(uow, current.slot_id, -current.party_size)
            .await?;
        let updated = Reservation {
            updated_by_call_id: request.call_id.clone(),
            ..current.cancelled(now_utc())
        };
        uow.tx().update_reservation(&updated, current.version).await?;

        self.audit
            .record(
                uow,
                AuditEntry {
                    change_type: ChangeType::Cancel,
                    changed_fields: &[],
                    idempotency_key: key,
                    request_fingerprint: fp,
                    call_id: request.call_id.as_deref(),
                    before: Some(&current),
                    after: &updated,
                },
            )
            .await?;
        Ok(Step::Apply(updated))
    }

    /// Commit or roll back the unit of work according to the step outcome.
    async fn settle(
        &self,
        uow: UnitOfWork,
        step: LedgerResult<Step>,
        key: &str,
        fp: &str,
    ) -> LedgerResult<Settled> {
        let reservation = match step {
            Ok(Step::Apply(reservation)) => reservation,
            Ok(Step::Replay(reservation)) => {
                uow.rollback().await;
                return Ok(Settled::Done(replayed(reservation)));
            }
            Ok(Step::Unchanged(reservation)) => {
                uow.rollback().await;
                return Ok(Settled::Done(MutationResult {
                    reservation,
                    outcome: Outcome::Unchanged,
                }));
            }
            Ok(Step::Retry(reason)) => {
                uow.rollback().await;
                return Ok(Settled::Again(reason.to_string()));
            }
            Err(e) => {
                uow.rollback().await;
                return self.recover(e, key, fp).await;
            }
        };

        match uow.commit().await {
            Ok(()) => Ok(Settled::Done(MutationResult {
                reservation,
                outcome: Outcome::Committed,
            })),
            Err(e) => self.recover(e, key, fp).await,
        }
    }

    /// Resolve internal conflicts after the unit of work is gone.
    async fn recover(&self, err: LedgerError, key: &str, fp: &str) -> LedgerResult<Settled> {
        match err {
            LedgerError::DuplicateIdempotencyKey(_) => {
                let reservation = self.guard.resolve_conflict(key, fp).await?;
                Ok(Settled::Done(replayed(reservation)))
            }
            LedgerError::DuplicateConfirmationCode(_) | LedgerError::StaleWrite(_) => {
                Ok(Settled::Again(err.to_string()))
            }
            LedgerError::InvariantViolation(ref message) => {
                error!(idempotency_key = key, message = %message, "Ledger invariant violated");
                Err(err)
            }
            other => Err(other),
        }
    }

    async fn unique_code(&self, uow: &mut UnitOfWork) -> LedgerResult<String> {
        for _ in 0..CODE_ATTEMPTS {
            let code = self.codes.generate();
            if !uow.tx().confirmation_code_exists(&code).await? {
                return Ok(code);
            }
            warn!(code = %code, "Confirmation code collision");
        }
        Err(LedgerError::DuplicateConfirmationCode(format!(
            "no free code after {CODE_ATTEMPTS} draws"
        )))
    }

    fn ensure_writable(&self) -> LedgerResult<()> {
        if self.settings.read_only {
            return Err(LedgerError::ReadOnly);
        }
        Ok(())
    }

    fn exhausted(&self, operation: &str) -> LedgerError {
        warn!(operation, attempts = self.settings.max_attempts, "Giving up after repeated conflicts");
        LedgerError::StaleWrite(format!(
            "{operation} gave up after {} attempts",
            self.settings.max_attempts
        ))
    }

    // ── Reads ───────────────────────────────────────────────────

    pub async fn get(&self, confirmation_code: &str) -> LedgerResult<Reservation> {
        self.find_reservation(&normalize_code(confirmation_code)).await
    }

    pub async fn history(&self, confirmation_code: &str) -> LedgerResult<Vec<ReservationChange>> {
        self.audit.history_for_code(confirmation_code).await
    }

    pub async fn quote_change(
        &self,
        confirmation_code: &str,
        changes: &ReservationChanges,
    ) -> LedgerResult<ChangeQuote> {
        let current = self.get(confirmation_code).await?;
        if current.is_cancelled() {
            return Ok(ChangeQuote::refused("reservation is cancelled"));
        }
        let party_size = changes.party_size_or(&current);
        if let Err(e) = validate_party_size(party_size, self.settings.max_party_size) {
            return Ok(ChangeQuote::refused(e.to_string()));
        }
        let target_id = match self.resolve_target(&current, changes.target).await {
            Ok(id) => id,
            Err(LedgerError::NotFound { .. }) => {
                return Ok(ChangeQuote::refused("no tee time at the requested time"))
            }
            Err(e) => return Err(e),
        };
        let target = self
            .store
            .slot(target_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Slot", "slot_id", target_id))?;

        let moving = target_id != current.slot_id;
        // Players that need a free spot on the target; a same-slot change only adds the delta.
        let needed = if moving {
            party_size
        } else {
            (party_size - current.party_size).max(0)
        };
        let capacity_ok = needed == 0 || target.can_accommodate(needed);
        let reason = (!capacity_ok).then(|| {
            let left = spots(target.remaining());
            if target.closed {
                "tee time is closed".to_string()
            } else if moving {
                format!("only {left} left for a party of {party_size}")
            } else {
                format!(
                    "only {left} left for {needed} additional player{}",
                    if needed == 1 { "" } else { "s" }
                )
            }
        });

        Ok(ChangeQuote {
            can_change: capacity_ok,
            reason,
            capacity_ok,
            target_slot_id: Some(target_id),
            target_start_time: Some(target.start_time),
        })
    }

    async fn find_reservation(&self, code: &str) -> LedgerResult<Reservation> {
        self.store
            .reservation_by_code(code)
            .await?
            .ok_or_else(|| LedgerError::not_found("Reservation", "confirmation_code", code))
    }

    /// Slot a modify should land on. No target means the current slot.
    async fn resolve_target(
        &self,
        current: &Reservation,
        target: Option<SlotTarget>,
    ) -> LedgerResult<SlotId> {
        let Some(target) = target else {
            return Ok(current.slot_id);
        };
        let source = self
            .store
            .slot(current.slot_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Slot", "slot_id", current.slot_id))?;

        let slot = match target {
            SlotTarget::Slot(slot_id) => self
                .store
                .slot(slot_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("Slot", "slot_id", slot_id))?,
            SlotTarget::StartTime(start_time) => self
                .store
                .slot_at(&source.venue_id, start_time)
                .await?
                .ok_or_else(|| {
                    LedgerError::not_found("Slot", "start_time", start_time.to_rfc3339())
                })?,
            SlotTarget::LocalTime(local) => {
                let venue = self
                    .store
                    .venue(&source.venue_id)
                    .await?
                    .ok_or_else(|| LedgerError::not_found("Venue", "venue_id", &source.venue_id))?;
                let offset = venue.offset()?;
                let date = source.start_time.with_timezone(&offset).date_naive();
                let start_time = offset
                    .from_local_datetime(&date.and_time(local))
                    .single()
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok_or_else(|| {
                        LedgerError::Validation(format!("invalid local time {date} {local}"))
                    })?;
                self.store
                    .slot_at(&source.venue_id, start_time)
                    .await?
                    .ok_or_else(|| LedgerError::not_found("Slot", "start_local", local))?
            }
        };
        if slot.venue_id != source.venue_id {
            return Err(LedgerError::Validation(format!(
                "slot {} belongs to another venue",
                slot.slot_id
            )));
        }
        Ok(slot.slot_id)
    }
}

fn replayed(reservation: Reservation) -> MutationResult {
    MutationResult {
        reservation,
        outcome: Outcome::Replayed,
    }
}

fn spots(n: i32) -> String {
    match n {
        1 => "1 spot".to_string(),
        n => format!("{} spots", n.max(0)),
    }
}

fn record_outcome(operation: &'static str, result: &LedgerResult<MutationResult>, start: Instant) {
    let outcome = match result {
        Ok(r) => r.outcome.as_str(),
        Err(e) => e.kind(),
    };
    metrics::counter!("ledger_mutations_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("ledger_mutation_duration_seconds", "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}
