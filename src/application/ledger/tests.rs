use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use proptest::prelude::*;

use super::*;
use crate::domain::{
    ChangeType, Contact, LedgerStore, NewSlot, ReservationChanges, ReservationStatus, RoundType,
    Slot, SlotTarget, Venue,
};
use crate::infrastructure::storage::InMemoryLedgerStore;
use crate::shared::errors::{LedgerError, LedgerResult, UnavailableReason};

struct Fixture {
    memory: InMemoryLedgerStore,
    store: Arc<dyn LedgerStore>,
    ledger: Arc<ReservationLedger>,
}

impl Fixture {
    fn new() -> Self {
        Self::with(InMemoryLedgerStore::default(), LedgerSettings::default())
    }

    fn with(memory: InMemoryLedgerStore, settings: LedgerSettings) -> Self {
        let store: Arc<dyn LedgerStore> = Arc::new(memory.clone());
        let ledger = Arc::new(ReservationLedger::new(store.clone(), settings));
        Self {
            memory,
            store,
            ledger,
        }
    }

    async fn slot(&self, hour: u32, capacity: i32) -> Slot {
        self.store
            .upsert_venue(&Venue::new("0", "Demo Links", 0).unwrap())
            .await
            .unwrap();
        let (slot, _) = self
            .store
            .ensure_slot(&NewSlot {
                venue_id: "0".into(),
                start_time: Utc.with_ymd_and_hms(2030, 6, 1, hour, 0, 0).unwrap(),
                capacity,
                base_price_cents: 10_000,
                currency: "USD".into(),
            })
            .await
            .unwrap();
        slot
    }

    async fn booked(&self, slot: &Slot) -> i32 {
        self.store
            .slot(slot.slot_id)
            .await
            .unwrap()
            .unwrap()
            .booked_count
    }

    async fn book(&self, slot: &Slot, party_size: i32, key: &str) -> LedgerResult<MutationResult> {
        self.ledger.book(book_request(slot, party_size, key)).await
    }
}

fn book_request(slot: &Slot, party_size: i32, key: &str) -> BookRequest {
    BookRequest {
        slot_id: slot.slot_id,
        party_size,
        round_type: RoundType::Walking,
        holes: 18,
        contact: Some(Contact {
            name: "Pat Doe".into(),
            phone_e164: "+15551234567".into(),
        }),
        idempotency_key: key.into(),
        call_id: None,
    }
}

fn modify_request(code: &str, changes: ReservationChanges, key: &str) -> ModifyRequest {
    ModifyRequest {
        confirmation_code: code.into(),
        changes,
        idempotency_key: key.into(),
        call_id: None,
    }
}

fn cancel_request(code: &str, key: &str) -> CancelRequest {
    CancelRequest {
        confirmation_code: code.into(),
        idempotency_key: key.into(),
        call_id: None,
    }
}


// ── Book ────────────────────────────────────────────────────────

#[tokio::test]
async fn book_claims_capacity_and_records_create() {
    let fx = Fixture::new();
    let slot = fx.slot(8, 4).await;

    let result = fx.book(&slot, 3, "call-1:book").await.unwrap();
    assert_eq!(result.outcome, Outcome::Committed);
    assert_eq!(result.reservation.status, ReservationStatus::Booked);
    assert_eq!(result.reservation.version, 1);
    assert!(result.reservation.confirmation_code.starts_with("RES-"));
    assert!(result.reservation.customer_id.is_some());
    assert_eq!(fx.booked(&slot).await, 3);

    let history = fx
        .ledger
        .history(&result.reservation.confirmation_code)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].change_type, ChangeType::Create);
    assert!(history[0].before_state.is_none());
    assert!(history[0].prev_hash.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_concurrent_pairs_on_a_foursome() {
    let fx = Fixture::new();
    let slot = fx.slot(8, 4).await;

    let mut handles = Vec::new();
    for i in 0..3 {
        let ledger = fx.ledger.clone();
        let request = book_request(&slot, 2, &format!("pair-{i}"));
        handles.push(tokio::spawn(async move { ledger.book(request).await }));
    }

    let mut booked = 0;
    let mut unavailable = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(r) => {
                assert_eq!(r.outcome, Outcome::Committed);
                booked += 1;
            }
            Err(LedgerError::SlotUnavailable {
                reason: UnavailableReason::CapacityExceeded,
                ..
            }) => unavailable += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((booked, unavailable), (2, 1));
    assert_eq!(fx.booked(&slot).await, 4);
}

#[tokio::test]
async fn same_key_same_payload_replays_the_booking() {
    let fx = Fixture::new();
    let slot = fx.slot(8, 4).await;

    let first = fx.book(&slot, 2, "call-7:book").await.unwrap();
    let second = fx.book(&slot, 2, "call-7:book").await.unwrap();

    assert_eq!(second.outcome, Outcome::Replayed);
    assert_eq!(
        first.reservation.confirmation_code,
        second.reservation.confirmation_code
    );
    assert_eq!(first.reservation, second.reservation);
    assert_eq!(fx.booked(&slot).await, 2);
    assert_eq!(
        fx.ledger
            .history(&first.reservation.confirmation_code)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_retries_with_one_key_book_once() {
    let fx = Fixture::new();
    let slot = fx.slot(8, 4).await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let ledger = fx.ledger.clone();
        let request = book_request(&slot, 2, "call-9:book");
        handles.push(tokio::spawn(async move { ledger.book(request).await }));
    }

    let mut codes = Vec::new();
    let mut committed = 0;
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        if result.outcome == Outcome::Committed {
            committed += 1;
        }
        codes.push(result.reservation.confirmation_code);
    }
    codes.dedup();
    assert_eq!(codes.len(), 1);
    assert_eq!(committed, 1);
    assert_eq!(fx.booked(&slot).await, 2);
}

#[tokio::test]
async fn same_key_different_payload_is_refused() {
    let fx = Fixture::new();
    let slot = fx.slot(8, 4).await;

    fx.book(&slot, 2, "call-3:book").await.unwrap();
    let err = fx.book(&slot, 3, "call-3:book").await.unwrap_err();
    assert!(matches!(err, LedgerError::IdempotencyKeyReused(_)));
    assert_eq!(fx.booked(&slot).await, 2);
}

#[tokio::test]
async fn book_validates_party_size_and_holes() {
    let fx = Fixture::new();
    let slot = fx.slot(8, 4).await;

    assert!(matches!(
        fx.book(&slot, 5, "k1").await,
        Err(LedgerError::Validation(_))
    ));
    assert!(matches!(
        fx.book(&slot, 0, "k2").await,
        Err(LedgerError::Validation(_))
    ));

    let mut request = book_request(&slot, 2, "k3");
    request.holes = 12;
    assert!(matches!(
        fx.ledger.book(request).await,
        Err(LedgerError::Validation(_))
    ));
    assert_eq!(fx.booked(&slot).await, 0);
}

#[tokio::test]
async fn party_larger_than_slot_capacity_is_unavailable() {
    let fx = Fixture::new();
    let slot = fx.slot(8, 2).await;
    let err = fx.book(&slot, 3, "k1").await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::SlotUnavailable {
            reason: UnavailableReason::CapacityExceeded,
            ..
        }
    ));
}

#[tokio::test]
async fn closed_slot_refuses_bookings() {
    let fx = Fixture::new();
    let slot = fx.slot(8, 4).await;
    fx.store.set_slot_closed(slot.slot_id, true).await.unwrap();

    let err = fx.book(&slot, 1, "k1").await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::SlotUnavailable {
            reason: UnavailableReason::Closed,
            ..
        }
    ));
}

#[tokio::test]
async fn unknown_slot_is_not_found() {
    let fx = Fixture::new();
    let mut ghost = fx.slot(8, 4).await;
    ghost.slot_id = uuid::Uuid::new_v4();
    assert!(matches!(
        fx.book(&ghost, 1, "k1").await,
        Err(LedgerError::NotFound { .. })
    ));
}

#[tokio::test]
async fn read_only_mode_refuses_every_mutation() {
    let fx = Fixture::with(
        InMemoryLedgerStore::default(),
        LedgerSettings {
            read_only: true,
            ..LedgerSettings::default()
        },
    );
    let slot = fx.slot(8, 4).await;

    assert!(matches!(fx.book(&slot, 1, "k1").await, Err(LedgerError::ReadOnly)));
    assert!(matches!(
        fx.ledger.cancel(cancel_request("RES-AAAAAA", "k2")).await,
        Err(LedgerError::ReadOnly)
    ));
    assert!(matches!(
        fx.ledger
            .modify(modify_request("RES-AAAAAA", ReservationChanges::default(), "k3"))
            .await,
        Err(LedgerError::ReadOnly)
    ));
    assert_eq!(fx.booked(&slot).await, 0);
}

#[tokio::test]
async fn held_slot_lock_times_out() {
    let fx = Fixture::with(
        InMemoryLedgerStore::new(Duration::from_millis(50)),
        LedgerSettings::default(),
    );
    let slot = fx.slot(8, 4).await;

    let mut holder = fx.store.begin().await.unwrap();
    holder.lock_slot(slot.slot_id).await.unwrap();

    let err = fx.book(&slot, 1, "k1").await.unwrap_err();
    assert!(matches!(err, LedgerError::LockTimeout(_)));
    assert!(err.is_retryable());

    holder.rollback().await.unwrap();
    let ok = fx.book(&slot, 1, "k1").await.unwrap();
    assert_eq!(ok.outcome, Outcome::Committed);
}

// ── Modify ──────────────────────────────────────────────────────

#[tokio::test]
async fn move_to_a_full_slot_leaves_both_counts_unchanged() {
    let fx = Fixture::new();
    let a = fx.slot(8, 4).await;
    let b = fx.slot(9, 4).await;

    let mine = fx.book(&a, 2, "mine").await.unwrap();
    fx.book(&a, 2, "other-a").await.unwrap();
    fx.book(&b, 3, "other-b").await.unwrap();

    let err = fx
        .ledger
        .modify(modify_request(
            &mine.reservation.confirmation_code,
            ReservationChanges {
                target: Some(SlotTarget::Slot(b.slot_id)),
                ..Default::default()
            },
            "move-1",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::SlotUnavailable { .. }));
    assert_eq!(fx.booked(&a).await, 4);
    assert_eq!(fx.booked(&b).await, 3);

    let current = fx.ledger.get(&mine.reservation.confirmation_code).await.unwrap();
    assert_eq!(current, mine.reservation);
    assert_eq!(
        fx.ledger
            .history(&mine.reservation.confirmation_code)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn combined_modify_records_one_change_with_all_fields() {
    let fx = Fixture::new();
    let a = fx.slot(8, 4).await;
    let b = fx.slot(9, 4).await;
    let booked = fx.book(&a, 2, "b1").await.unwrap().reservation;

    let result = fx
        .ledger
        .modify(modify_request(
            &booked.confirmation_code,
            ReservationChanges {
                target: Some(SlotTarget::Slot(b.slot_id)),
                party_size: Some(3),
                round_type: Some(RoundType::Riding),
            },
            "m1",
        ))
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Committed);
    assert_eq!(result.reservation.slot_id, b.slot_id);
    assert_eq!(result.reservation.party_size, 3);
    assert_eq!(result.reservation.round_type, RoundType::Riding);
    assert_eq!(result.reservation.version, 2);
    assert_eq!(fx.booked(&a).await, 0);
    assert_eq!(fx.booked(&b).await, 3);

    let history = fx.ledger.history(&booked.confirmation_code).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].change_type, ChangeType::UpdateTime);
    assert_eq!(
        history[1].changed_fields,
        vec!["time", "party_size", "round_type"]
    );
    assert_eq!(history[1].prev_hash.as_deref(), Some(history[0].entry_hash.as_str()));
}

#[tokio::test]
async fn party_size_change_applies_the_delta_in_place() {
    let fx = Fixture::new();
    let a = fx.slot(8, 4).await;
    let booked = fx.book(&a, 3, "b1").await.unwrap().reservation;

    let shrink = fx
        .ledger
        .modify(modify_request(
            &booked.confirmation_code,
            ReservationChanges {
                party_size: Some(1),
                ..Default::default()
            },
            "m1",
        ))
        .await
        .unwrap();
    assert_eq!(shrink.reservation.party_size, 1);
    assert_eq!(fx.booked(&a).await, 1);

    fx.book(&a, 3, "b2").await.unwrap();
    let err = fx
        .ledger
        .modify(modify_request(
            &booked.confirmation_code,
            ReservationChanges {
                party_size: Some(2),
                ..Default::default()
            },
            "m2",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::SlotUnavailable { .. }));
    assert_eq!(fx.booked(&a).await, 4);

    let history = fx.ledger.history(&booked.confirmation_code).await.unwrap();
    assert_eq!(history.last().unwrap().change_type, ChangeType::UpdatePartySize);
}

#[tokio::test]
async fn round_type_change_is_labelled_update_type() {
    let fx = Fixture::new();
    let a = fx.slot(8, 4).await;
    let booked = fx.book(&a, 2, "b1").await.unwrap().reservation;

    fx.ledger
        .modify(modify_request(
            &booked.confirmation_code,
            ReservationChanges {
                round_type: Some(RoundType::Riding),
                ..Default::default()
            },
            "m1",
        ))
        .await
        .unwrap();

    let history = fx.ledger.history(&booked.confirmation_code).await.unwrap();
    assert_eq!(history[1].change_type, ChangeType::UpdateType);
    assert_eq!(history[1].changed_fields, vec!["round_type"]);
    assert_eq!(fx.booked(&a).await, 2);
}

#[tokio::test]
async fn modify_to_current_values_is_a_no_op() {
    let fx = Fixture::new();
    let a = fx.slot(8, 4).await;
    let booked = fx.book(&a, 2, "b1").await.unwrap().reservation;

    let result = fx
        .ledger
        .modify(modify_request(
            &booked.confirmation_code,
            ReservationChanges {
                target: Some(SlotTarget::Slot(a.slot_id)),
                party_size: Some(2),
                round_type: Some(RoundType::Walking),
            },
            "m1",
        ))
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Unchanged);
    assert_eq!(result.reservation, booked);
    assert_eq!(
        fx.ledger.history(&booked.confirmation_code).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn move_by_start_time_at_the_same_venue() {
    let fx = Fixture::new();
    let a = fx.slot(8, 4).await;
    let b = fx.slot(10, 4).await;
    let booked = fx.book(&a, 2, "b1").await.unwrap().reservation;

    let result = fx
        .ledger
        .modify(modify_request(
            &booked.confirmation_code.to_lowercase(),
            ReservationChanges {
                target: Some(SlotTarget::StartTime(b.start_time)),
                ..Default::default()
            },
            "m1",
        ))
        .await
        .unwrap();
    assert_eq!(result.reservation.slot_id, b.slot_id);

    let missing = fx
        .ledger
        .modify(modify_request(
            &booked.confirmation_code,
            ReservationChanges {
                target: Some(SlotTarget::StartTime(b.start_time + ChronoDuration::minutes(7))),
                ..Default::default()
            },
            "m2",
        ))
        .await
        .unwrap_err();
    assert!(matches!(missing, LedgerError::NotFound { .. }));
}

#[tokio::test]
async fn move_by_local_time_keeps_the_date() {
    let fx = Fixture::new();
    let a = fx.slot(8, 4).await;
    let b = fx.slot(9, 4).await;
    let booked = fx.book(&a, 2, "b1").await.unwrap().reservation;

    let result = fx
        .ledger
        .modify(modify_request(
            &booked.confirmation_code,
            ReservationChanges {
                target: Some(SlotTarget::LocalTime(
                    chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                )),
                ..Default::default()
            },
            "m1",
        ))
        .await
        .unwrap();
    assert_eq!(result.reservation.slot_id, b.slot_id);
    assert_eq!(fx.booked(&a).await, 0);
    assert_eq!(fx.booked(&b).await, 2);
}

#[tokio::test]
async fn modify_replay_returns_the_stored_result() {
    let fx = Fixture::new();
    let a = fx.slot(8, 4).await;
    let booked = fx.book(&a, 1, "b1").await.unwrap().reservation;
    let changes = ReservationChanges {
        party_size: Some(2),
        ..Default::default()
    };

    let first = fx
        .ledger
        .modify(modify_request(&booked.confirmation_code, changes.clone(), "m1"))
        .await
        .unwrap();
    let again = fx
        .ledger
        .modify(modify_request(&booked.confirmation_code, changes, "m1"))
        .await
        .unwrap();

    assert_eq!(again.outcome, Outcome::Replayed);
    assert_eq!(again.reservation, first.reservation);
    assert_eq!(fx.booked(&a).await, 2);
}

#[tokio::test]
async fn modify_of_cancelled_reservation_fails() {
    let fx = Fixture::new();
    let a = fx.slot(8, 4).await;
    let booked = fx.book(&a, 2, "b1").await.unwrap().reservation;
    fx.ledger
        .cancel(cancel_request(&booked.confirmation_code, "c1"))
        .await
        .unwrap();

    let err = fx
        .ledger
        .modify(modify_request(
            &booked.confirmation_code,
            ReservationChanges {
                party_size: Some(1),
                ..Default::default()
            },
            "m1",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyCancelled(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_moves_between_two_slots_do_not_deadlock() {
    let fx = Fixture::with(
        InMemoryLedgerStore::new(Duration::from_millis(300)),
        LedgerSettings::default(),
    );
    let a = fx.slot(8, 6).await;
    let b = fx.slot(9, 6).await;

    let mut codes = Vec::new();
    for (i, slot) in [&a, &b, &a, &b, &a, &b].into_iter().enumerate() {
        let booked = fx.book(slot, 1, &format!("seat-{i}")).await.unwrap();
        codes.push(booked.reservation.confirmation_code);
    }

    for round in 0..6 {
        let mut handles = Vec::new();
        for (i, code) in codes.iter().enumerate() {
            let current = fx.ledger.get(code).await.unwrap();
            let other = if current.slot_id == a.slot_id { &b } else { &a };
            let request = modify_request(
                code,
                ReservationChanges {
                    target: Some(SlotTarget::Slot(other.slot_id)),
                    ..Default::default()
                },
                &format!("swap-{round}-{i}"),
            );
            let ledger = fx.ledger.clone();
            handles.push(tokio::spawn(async move { ledger.modify(request).await }));
        }
        for handle in handles {
            match handle.await.unwrap() {
                Ok(r) => assert_eq!(r.outcome, Outcome::Committed),
                Err(e) => panic!("round {round}: unexpected error: {e}"),
            }
        }

        let mut expected = (0, 0);
        for code in &codes {
            let r = fx.ledger.get(code).await.unwrap();
            assert_eq!(r.status, ReservationStatus::Booked);
            if r.slot_id == a.slot_id {
                expected.0 += r.party_size;
            } else {
                expected.1 += r.party_size;
            }
        }
        assert_eq!((fx.booked(&a).await, fx.booked(&b).await), expected);
        assert_eq!(expected, (3, 3));
    }
}

// ── Cancel ──────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_releases_exactly_the_party() {
    let fx = Fixture::new();
    let a = fx.slot(8, 4).await;
    fx.book(&a, 1, "b0").await.unwrap();
    let booked = fx.book(&a, 3, "b1").await.unwrap().reservation;
    assert_eq!(fx.booked(&a).await, 4);

    let result = fx
        .ledger
        .cancel(cancel_request(&booked.confirmation_code, "c1"))
        .await
        .unwrap();
    assert_eq!(result.outcome, Outcome::Committed);
    assert_eq!(result.reservation.status, ReservationStatus::Cancelled);
    assert!(result.reservation.cancelled_at.is_some());
    assert_eq!(result.reservation.version, 2);
    assert_eq!(fx.booked(&a).await, 1);

    let history = fx.ledger.history(&booked.confirmation_code).await.unwrap();
    assert_eq!(history.last().unwrap().change_type, ChangeType::Cancel);
}

#[tokio::test]
async fn cancelling_twice_is_a_quiet_success() {
    let fx = Fixture::new();
    let a = fx.slot(8, 4).await;
    let booked = fx.book(&a, 2, "b1").await.unwrap().reservation;
    let code = booked.confirmation_code.as_str();

    let first = fx.ledger.cancel(cancel_request(code, "c1")).await.unwrap();
    let replay = fx.ledger.cancel(cancel_request(code, "c1")).await.unwrap();
    let fresh_key = fx.ledger.cancel(cancel_request(code, "c2")).await.unwrap();

    assert_eq!(replay.outcome, Outcome::Replayed);
    assert_eq!(fresh_key.outcome, Outcome::Unchanged);
    for r in [&first, &replay, &fresh_key] {
        assert_eq!(r.reservation.status, ReservationStatus::Cancelled);
    }
    assert_eq!(fx.booked(&a).await, 0);
    assert_eq!(fx.ledger.history(code).await.unwrap().len(), 2);
}

#[tokio::test]
async fn cancel_of_unknown_code_is_not_found() {
    let fx = Fixture::new();
    let err = fx
        .ledger
        .cancel(cancel_request("RES-NOPE00", "c1"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));
}

#[tokio::test]
async fn cancel_on_closed_slot_still_releases() {
    let fx = Fixture::new();
    let a = fx.slot(8, 4).await;
    let booked = fx.book(&a, 2, "b1").await.unwrap().reservation;
    fx.store.set_slot_closed(a.slot_id, true).await.unwrap();

    fx.ledger
        .cancel(cancel_request(&booked.confirmation_code, "c1"))
        .await
        .unwrap();
    assert_eq!(fx.booked(&a).await, 0);
}

// ── Audit ───────────────────────────────────────────────────────

#[tokio::test]
async fn hash_chain_verifies_and_detects_tampering() {
    let fx = Fixture::new();
    let a = fx.slot(8, 4).await;
    let booked = fx.book(&a, 2, "b1").await.unwrap().reservation;
    fx.ledger
        .modify(modify_request(
            &booked.confirmation_code,
            ReservationChanges {
                party_size: Some(3),
                ..Default::default()
            },
            "m1",
        ))
        .await
        .unwrap();
    fx.ledger
        .cancel(cancel_request(&booked.confirmation_code, "c1"))
        .await
        .unwrap();

    let audit = fx.ledger.audit();
    assert_eq!(audit.verify(booked.reservation_id).await.unwrap(), 3);

    let history = audit.history(booked.reservation_id).await.unwrap();
    fx.memory.tamper_change(history[1].seq, |c| {
        c.after_state = c.after_state.replace("\"party_size\":3", "\"party_size\":1");
    });
    let err = audit.verify(booked.reservation_id).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvariantViolation(_)));
}

#[tokio::test]
async fn call_ids_are_attributed_and_chained() {
    let fx = Fixture::new();
    let a = fx.slot(8, 4).await;

    let mut request = book_request(&a, 2, "b1");
    request.call_id = Some("call-1".into());
    let booked = fx.ledger.book(request).await.unwrap().reservation;
    assert_eq!(booked.created_by_call_id.as_deref(), Some("call-1"));
    assert_eq!(booked.updated_by_call_id.as_deref(), Some("call-1"));

    let mut retry = book_request(&a, 2, "b1");
    retry.call_id = Some("call-1b".into());
    let replay = fx.ledger.book(retry).await.unwrap();
    assert_eq!(replay.outcome, Outcome::Replayed);
    assert_eq!(replay.reservation.created_by_call_id.as_deref(), Some("call-1"));

    let mut modify = modify_request(
        &booked.confirmation_code,
        ReservationChanges {
            party_size: Some(3),
            ..Default::default()
        },
        "m1",
    );
    modify.call_id = Some("call-2".into());
    let modified = fx.ledger.modify(modify).await.unwrap().reservation;
    assert_eq!(modified.created_by_call_id.as_deref(), Some("call-1"));
    assert_eq!(modified.updated_by_call_id.as_deref(), Some("call-2"));

    let mut cancel = cancel_request(&booked.confirmation_code, "c1");
    cancel.call_id = Some("call-3".into());
    let cancelled = fx.ledger.cancel(cancel).await.unwrap().reservation;
    assert_eq!(cancelled.updated_by_call_id.as_deref(), Some("call-3"));

    let history = fx.ledger.history(&booked.confirmation_code).await.unwrap();
    let call_ids: Vec<_> = history.iter().map(|c| c.call_id.as_deref()).collect();
    assert_eq!(call_ids, vec![Some("call-1"), Some("call-2"), Some("call-3")]);

    let audit = fx.ledger.audit();
    assert_eq!(audit.verify(booked.reservation_id).await.unwrap(), 3);
    fx.memory.tamper_change(history[1].seq, |c| {
        c.call_id = Some("call-x".into());
    });
    assert!(matches!(
        audit.verify(booked.reservation_id).await,
        Err(LedgerError::InvariantViolation(_))
    ));
}

// ── Reads ───────────────────────────────────────────────────────

#[tokio::test]
async fn quote_change_reports_capacity_without_writing() {
    let fx = Fixture::new();
    let a = fx.slot(8, 4).await;
    let b = fx.slot(9, 4).await;
    let booked = fx.book(&a, 2, "b1").await.unwrap().reservation;
    fx.book(&b, 3, "b2").await.unwrap();

    let to_b = fx
        .ledger
        .quote_change(
            &booked.confirmation_code,
            &ReservationChanges {
                target: Some(SlotTarget::Slot(b.slot_id)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!to_b.can_change);
    assert!(!to_b.capacity_ok);
    assert_eq!(to_b.target_start_time, Some(b.start_time));

    let grow = fx
        .ledger
        .quote_change(
            &booked.confirmation_code,
            &ReservationChanges {
                party_size: Some(4),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(grow.can_change);
    assert_eq!(fx.booked(&a).await, 2);

    let nowhere = fx
        .ledger
        .quote_change(
            &booked.confirmation_code,
            &ReservationChanges {
                target: Some(SlotTarget::StartTime(a.start_time + ChronoDuration::minutes(3))),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!nowhere.can_change);
    assert!(nowhere.reason.is_some());
}

#[tokio::test]
async fn quote_change_reason_names_the_players_that_need_a_spot() {
    let fx = Fixture::new();
    let a = fx.slot(8, 4).await;
    let b = fx.slot(9, 4).await;
    let booked = fx.book(&a, 2, "b1").await.unwrap().reservation;
    fx.book(&a, 1, "b2").await.unwrap();
    fx.book(&b, 3, "b3").await.unwrap();

    let grow = |party_size| ReservationChanges {
        party_size: Some(party_size),
        ..Default::default()
    };

    let by_one = fx
        .ledger
        .quote_change(&booked.confirmation_code, &grow(3))
        .await
        .unwrap();
    assert!(by_one.can_change);
    assert!(by_one.reason.is_none());

    let by_two = fx
        .ledger
        .quote_change(&booked.confirmation_code, &grow(4))
        .await
        .unwrap();
    assert!(!by_two.capacity_ok);
    assert_eq!(
        by_two.reason.as_deref(),
        Some("only 1 spot left for 2 additional players")
    );

    let to_b = fx
        .ledger
        .quote_change(
            &booked.confirmation_code,
            &ReservationChanges {
                target: Some(SlotTarget::Slot(b.slot_id)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(to_b.reason.as_deref(), Some("only 1 spot left for a party of 2"));
}

// ── Properties ──────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn concurrent_bookers_never_exceed_capacity(
        capacity in 1i32..=6,
        parties in prop::collection::vec(1i32..=4, 2..10),
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        let (booked, committed_party_total, all_rejections_are_capacity) = runtime.block_on(async {
            let fx = Fixture::new();
            let slot = fx.slot(8, capacity).await;

            let handles: Vec<_> = parties
                .iter()
                .enumerate()
                .map(|(i, party)| {
                    let ledger = fx.ledger.clone();
                    let request = book_request(&slot, *party, &format!("p-{i}"));
                    tokio::spawn(async move { ledger.book(request).await })
                })
                .collect();

            let mut total = 0;
            let mut clean = true;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(r) => total += r.reservation.party_size,
                    Err(LedgerError::SlotUnavailable { .. }) => {}
                    Err(_) => clean = false,
                }
            }
            (fx.booked(&slot).await, total, clean)
        });

        prop_assert!(booked <= capacity);
        prop_assert_eq!(booked, committed_party_total);
        prop_assert!(all_rejections_are_capacity);
    }
}
