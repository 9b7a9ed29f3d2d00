//! Tee-time slot and venue entities

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::errors::{LedgerError, LedgerResult, UnavailableReason};

pub type SlotId = Uuid;

/// A course (or any bookable venue) that owns slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    pub venue_id: String,
    pub name: String,
    /// Fixed offset from UTC used to read local dates and times.
    pub utc_offset_minutes: i32,
}

impl Venue {
    pub fn new(
        venue_id: impl Into<String>,
        name: impl Into<String>,
        utc_offset_minutes: i32,
    ) -> LedgerResult<Self> {
        let venue = Self {
            venue_id: venue_id.into(),
            name: name.into(),
            utc_offset_minutes,
        };
        venue.offset()?;
        if venue.venue_id.trim().is_empty() {
            return Err(LedgerError::Validation("venue_id must not be empty".into()));
        }
        Ok(venue)
    }

    pub fn offset(&self) -> LedgerResult<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            LedgerError::Validation(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            ))
        })
    }
}

/// One bookable tee time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub slot_id: SlotId,
    pub venue_id: String,
    pub start_time: DateTime<Utc>,
    pub capacity: i32,
    pub booked_count: i32,
    pub closed: bool,
    /// Price per player, in minor units.
    pub base_price_cents: i64,
    pub currency: String,
    pub version: i64,
}

impl Slot {
    /// Build a slot from raw row values, rejecting anything that breaks the
    /// capacity invariant.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        slot_id: SlotId,
        venue_id: impl Into<String>,
        start_time: DateTime<Utc>,
        capacity: i32,
        booked_count: i32,
        closed: bool,
        base_price_cents: i64,
        currency: impl Into<String>,
        version: i64,
    ) -> LedgerResult<Self> {
        let slot = Self {
            slot_id,
            venue_id: venue_id.into(),
            start_time,
            capacity,
            booked_count,
            closed,
            base_price_cents,
            currency: currency.into(),
            version,
        };
        slot.check_invariants()?;
        Ok(slot)
    }

    pub fn check_invariants(&self) -> LedgerResult<()> {
        if self.capacity <= 0 {
            return Err(LedgerError::InvariantViolation(format!(
                "slot {} has non-positive capacity {}",
                self.slot_id, self.capacity
            )));
        }
        if self.booked_count < 0 || self.booked_count > self.capacity {
            return Err(LedgerError::InvariantViolation(format!(
                "slot {} booked_count {} outside 0..={}",
                self.slot_id, self.booked_count, self.capacity
            )));
        }
        if self.base_price_cents < 0 {
            return Err(LedgerError::InvariantViolation(format!(
                "slot {} has negative price",
                self.slot_id
            )));
        }
        Ok(())
    }

    pub fn remaining(&self) -> i32 {
        self.capacity - self.booked_count
    }

    /// Whether a new party of `party_size` could be booked right now.
    pub fn can_accommodate(&self, party_size: i32) -> bool {
        !self.closed && party_size > 0 && self.remaining() >= party_size
    }

    /// Party sizes up to `max_party_size` that still fit.
    pub fn party_sizes_allowed(&self, max_party_size: i32) -> Vec<i32> {
        (1..=max_party_size)
            .filter(|p| self.can_accommodate(*p))
            .collect()
    }

    /// Returns the slot with `delta` added to the booked count.
    ///
    /// Positive deltas are refused on closed slots and when they would exceed
    /// capacity. Releases are always accepted, but never below zero.
    pub fn with_delta(&self, delta: i32) -> LedgerResult<Slot> {
        let booked_count = self.booked_count.checked_add(delta).ok_or_else(|| {
            LedgerError::InvariantViolation(format!("slot {} booked_count overflow", self.slot_id))
        })?;

        if delta > 0 {
            if self.closed {
                return Err(LedgerError::SlotUnavailable {
                    slot_id: self.slot_id,
                    reason: UnavailableReason::Closed,
                });
            }
            if booked_count > self.capacity {
                return Err(LedgerError::SlotUnavailable {
                    slot_id: self.slot_id,
                    reason: UnavailableReason::CapacityExceeded,
                });
            }
        }
        if booked_count < 0 {
            return Err(LedgerError::InvariantViolation(format!(
                "slot {} would release {} but only {} booked",
                self.slot_id, -delta, self.booked_count
            )));
        }

        Ok(Slot {
            booked_count,
            version: self.version + 1,
            ..self.clone()
        })
    }
}

/// Input for inventory seeding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSlot {
    pub venue_id: String,
    pub start_time: DateTime<Utc>,
    pub capacity: i32,
    pub base_price_cents: i64,
    pub currency: String,
}

// ── Tests ──────────────────────────────────────────────────────
