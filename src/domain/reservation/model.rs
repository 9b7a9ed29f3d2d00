//! Reservation domain entity

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::slot::SlotId;
use crate::shared::errors::{LedgerError, LedgerResult};

pub type ReservationId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Booked,
    /// Terminal.
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Booked => "BOOKED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for ReservationStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOKED" => Ok(Self::Booked),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(LedgerError::InvariantViolation(format!(
                "unknown reservation status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundType {
    Walking,
    Riding,
}

impl RoundType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Walking => "WALKING",
            Self::Riding => "RIDING",
        }
    }
}

impl FromStr for RoundType {
    type Err = LedgerError;

    /// Case-insensitive; callers send "walking", "Riding", ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WALKING" => Ok(Self::Walking),
            "RIDING" => Ok(Self::Riding),
            other => Err(LedgerError::Validation(format!(
                "round_type must be WALKING or RIDING, got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for RoundType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary contact for a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub phone_e164: String,
}

impl Contact {
    pub fn validate(&self) -> LedgerResult<()> {
        let digits = self.phone_e164.strip_prefix('+').unwrap_or("");
        if !(8..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(LedgerError::Validation(format!(
                "phone_e164 must look like +15551234567, got '{}'",
                self.phone_e164
            )));
        }
        Ok(())
    }
}

/// One customer's claim on a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: ReservationId,
    pub confirmation_code: String,
    pub slot_id: SlotId,
    pub customer_id: Option<Uuid>,
    pub party_size: i32,
    pub round_type: RoundType,
    /// 9 or 18.
    pub holes: i32,
    pub status: ReservationStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by_call_id: Option<String>,
    #[serde(default)]
    pub updated_by_call_id: Option<String>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Booked
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == ReservationStatus::Cancelled
    }

    /// Copy with the status flipped to cancelled.
    pub fn cancelled(&self, at: DateTime<Utc>) -> Reservation {
        Reservation {
            status: ReservationStatus::Cancelled,
            cancelled_at: Some(at),
            updated_at: at,
            version: self.version + 1,
            ..self.clone()
        }
    }

    pub fn to_snapshot(&self) -> LedgerResult<String> {
        serde_json::to_string(self)
            .map_err(|e| LedgerError::InvariantViolation(format!("unserializable reservation: {e}")))
    }

    pub fn from_snapshot(json: &str) -> LedgerResult<Reservation> {
        serde_json::from_str(json)
            .map_err(|e| LedgerError::InvariantViolation(format!("malformed reservation snapshot: {e}")))
    }
}

pub fn validate_holes(holes: i32) -> LedgerResult<()> {
    match holes {
        9 | 18 => Ok(()),
        other => Err(LedgerError::Validation(format!(
            "holes must be 9 or 18, got {other}"
        ))),
    }
}

pub fn validate_party_size(party_size: i32, max_party_size: i32) -> LedgerResult<()> {
    if party_size < 1 || party_size > max_party_size {
        return Err(LedgerError::Validation(format!(
            "party_size must be between 1 and {max_party_size}, got {party_size}"
        )));
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::time::now_utc;

    fn sample_reservation() -> Reservation {
        let now = now_utc();
        Reservation {
            reservation_id: Uuid::new_v4(),
            confirmation_code: "RES-AB12CD".into(),
            slot_id: Uuid::new_v4(),
            customer_id: None,
            party_size: 2,
            round_type: RoundType::Walking,
            holes: 18,
            status: ReservationStatus::Booked,
            version: 1,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            created_by_call_id: None,
            updated_by_call_id: None,
        }
    }

    #[test]
    fn new_reservation_is_active() {
        let r = sample_reservation();
        assert!(r.is_active());
        assert!(!r.is_cancelled());
    }

    #[test]
    fn cancelled_bumps_version_and_sets_timestamp() {
        let r = sample_reservation();
        let at = now_utc();
        let c = r.cancelled(at);
        assert_eq!(c.status, ReservationStatus::Cancelled);
        assert_eq!(c.cancelled_at, Some(at));
        assert_eq!(c.version, 2);
        assert_eq!(c.confirmation_code, r.confirmation_code);
    }

    #[test]
    fn snapshot_survives_serialization() {
        let r = sample_reservation();
        let json = r.to_snapshot().unwrap();
        assert!(json.contains("\"status\":\"BOOKED\""));
        assert!(json.contains("\"round_type\":\"WALKING\""));
        assert_eq!(Reservation::from_snapshot(&json).unwrap(), r);
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(matches!(
            "EXPIRED".parse::<ReservationStatus>(),
            Err(LedgerError::InvariantViolation(_))
        ));
    }

    #[test]
    fn round_type_parsing_is_case_insensitive() {
        assert_eq!("riding".parse::<RoundType>().unwrap(), RoundType::Riding);
        assert_eq!(" Walking ".parse::<RoundType>().unwrap(), RoundType::Walking);
        assert!("cart".parse::<RoundType>().is_err());
    }

    #[test]
    fn party_size_and_holes_bounds() {
        assert!(validate_party_size(1, 4).is_ok());
        assert!(validate_party_size(4, 4).is_ok());
        assert!(validate_party_size(0, 4).is_err());
        assert!(validate_party_size(5, 4).is_err());
        assert!(validate_holes(9).is_ok());
        assert!(validate_holes(12).is_err());
    }

    #[test]
    fn contact_phone_validation() {
        let ok = Contact {
            name: "Pat".into(),
            phone_e164: "+15551234567".into(),
        };
        assert!(ok.validate().is_ok());

        let bad = Contact {
            name: "Pat".into(),
            phone_e164: "555-1234".into(),
        };
        assert!(bad.validate().is_err());
    }
}
