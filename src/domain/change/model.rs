//! Audit trail entries

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::reservation::ReservationId;
use crate::shared::errors::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Create,
    UpdateTime,
    UpdatePartySize,
    UpdateType,
    Cancel,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::UpdateTime => "UPDATE_TIME",
            Self::UpdatePartySize => "UPDATE_PARTY_SIZE",
            Self::UpdateType => "UPDATE_TYPE",
            Self::Cancel => "CANCEL",
        }
    }
}

impl FromStr for ChangeType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "UPDATE_TIME" => Ok(Self::UpdateTime),
            "UPDATE_PARTY_SIZE" => Ok(Self::UpdatePartySize),
            "UPDATE_TYPE" => Ok(Self::UpdateType),
            "CANCEL" => Ok(Self::Cancel),
            other => Err(LedgerError::InvariantViolation(format!(
                "unknown change type '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dimension of a reservation that a modify call can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedField {
    Time,
    PartySize,
    RoundType,
}

impl ChangedField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::PartySize => "party_size",
            Self::RoundType => "round_type",
        }
    }

    /// Label for a modify call. Fields are ordered by priority.
    pub fn change_type(fields: &[ChangedField]) -> Option<ChangeType> {
        fields.iter().min().map(|f| match f {
            Self::Time => ChangeType::UpdateTime,
            Self::PartySize => ChangeType::UpdatePartySize,
            Self::RoundType => ChangeType::UpdateType,
        })
    }
}

/// Everything needed to append one entry. `seq` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChange {
    pub change_id: Uuid,
    pub reservation_id: ReservationId,
    pub change_type: ChangeType,
    pub changed_fields: Vec<String>,
    pub idempotency_key: String,
    pub request_fingerprint: String,
    /// Caller's call/session id, when it sent one.
    pub call_id: Option<String>,
    pub before_state: Option<String>,
    pub after_state: String,
    pub prev_hash: Option<String>,
    pub entry_hash: String,
    pub created_at: DateTime<Utc>,
}

/// One committed state transition. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationChange {
    pub seq: i64,
    pub change_id: Uuid,
    pub reservation_id: ReservationId,
    pub change_type: ChangeType,
    pub changed_fields: Vec<String>,
    pub idempotency_key: String,
    pub request_fingerprint: String,
    pub call_id: Option<String>,
    /// JSON snapshot of the reservation before the change; absent on CREATE.
    pub before_state: Option<String>,
    pub after_state: String,
    pub prev_hash: Option<String>,
    pub entry_hash: String,
    pub created_at: DateTime<Utc>,
}

impl ReservationChange {
    pub fn from_new(seq: i64, new: NewChange) -> Self {
        Self {
            seq,
            change_id: new.change_id,
            reservation_id: new.reservation_id,
            change_type: new.change_type,
            changed_fields: new.changed_fields,
            idempotency_key: new.idempotency_key,
            request_fingerprint: new.request_fingerprint,
            call_id: new.call_id,
            before_state: new.before_state,
            after_state: new.after_state,
            prev_hash: new.prev_hash,
            entry_hash: new.entry_hash,
            created_at: new.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_type_round_trips_through_text() {
        for ct in [
            ChangeType::Create,
            ChangeType::UpdateTime,
            ChangeType::UpdatePartySize,
            ChangeType::UpdateType,
            ChangeType::Cancel,
        ] {
            assert_eq!(ct.as_str().parse::<ChangeType>().unwrap(), ct);
        }
        assert!("DELETE".parse::<ChangeType>().is_err());
    }

    #[test]
    fn modify_label_follows_priority() {
        use ChangedField::*;
        assert_eq!(
            ChangedField::change_type(&[RoundType, PartySize, Time]),
            Some(ChangeType::UpdateTime)
        );
        assert_eq!(
            ChangedField::change_type(&[RoundType, PartySize]),
            Some(ChangeType::UpdatePartySize)
        );
        assert_eq!(
            ChangedField::change_type(&[RoundType]),
            Some(ChangeType::UpdateType)
        );
        assert_eq!(ChangedField::change_type(&[]), None);
    }
}
