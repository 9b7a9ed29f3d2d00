//! Requested changes to an existing reservation

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Reservation, RoundType};
use crate::domain::slot::SlotId;

/// Where a time move should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotTarget {
    Slot(SlotId),
    /// A start time at the reservation's current venue.
    StartTime(DateTime<Utc>),
    /// Venue-local wall-clock time on the reservation's current date.
    LocalTime(NaiveTime),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationChanges {
    pub target: Option<SlotTarget>,
    pub party_size: Option<i32>,
    pub round_type: Option<RoundType>,
}

impl ReservationChanges {
    pub fn is_empty(&self) -> bool {
        self.target.is_none() && self.party_size.is_none() && self.round_type.is_none()
    }

    pub fn party_size_or(&self, current: &Reservation) -> i32 {
        self.party_size.unwrap_or(current.party_size)
    }

    pub fn round_type_or(&self, current: &Reservation) -> RoundType {
        self.round_type.unwrap_or(current.round_type)
    }
}
