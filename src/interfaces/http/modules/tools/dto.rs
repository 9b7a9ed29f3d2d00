//! Tool endpoint DTOs
//!
//! Request shapes are checked with `validator`; domain rules (party size
//! limits, phone format, round type spelling) are enforced by the ledger and
//! come back as 422 through the shared error mapping.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::application::search::{Price, SearchResult, TeeTimeOption, TimeWindow};
use crate::application::{CapacityCheck, ChangeQuote, Outcome};
use crate::domain::{Contact, ReservationChanges, RoundType, SlotTarget};
use crate::shared::errors::{LedgerError, LedgerResult};

/// `HH:MM` in venue-local time.
pub fn parse_local_time(field: &str, value: &str) -> LedgerResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| {
        LedgerError::Validation(format!("{field} must be HH:MM, got '{value}'"))
    })
}

fn parse_round_type(value: Option<&str>) -> LedgerResult<Option<RoundType>> {
    value.map(str::parse::<RoundType>).transpose()
}

// ── Search ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TimeWindowDto {
    /// e.g. "07:00"
    pub start_local: String,
    /// e.g. "11:30" (inclusive)
    pub end_local: String,
}

impl TimeWindowDto {
    fn parse(&self) -> LedgerResult<TimeWindow> {
        Ok(TimeWindow {
            start_local: parse_local_time("time_window.start_local", &self.start_local)?,
            end_local: parse_local_time("time_window.end_local", &self.end_local)?,
        })
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SearchTeeTimesRequest {
    /// Caller correlation ID, logged only
    pub call_id: Option<String>,
    #[validate(length(min = 1, max = 64))]
    #[serde(alias = "course_id")]
    pub venue_id: String,
    /// Venue-local date, `YYYY-MM-DD`
    pub date: NaiveDate,
    #[validate(nested)]
    pub time_window: Option<TimeWindowDto>,
    #[validate(range(min = 1))]
    #[serde(alias = "players")]
    pub party_size: i32,
    #[validate(range(min = 1, max = 100))]
    pub max_results: Option<u32>,
}

impl SearchTeeTimesRequest {
    pub fn time_window(&self) -> LedgerResult<Option<TimeWindow>> {
        self.time_window.as_ref().map(TimeWindowDto::parse).transpose()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PriceDto {
    pub currency: String,
    pub per_player_cents: i64,
    pub total_cents: i64,
}

impl From<Price> for PriceDto {
    fn from(p: Price) -> Self {
        Self {
            currency: p.currency,
            per_player_cents: p.per_player_cents,
            total_cents: p.total_cents,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TeeTimeOptionDto {
    pub slot_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub start_local: String,
    pub duration_minutes: u32,
    pub remaining: i32,
    pub party_sizes_allowed: Vec<i32>,
    pub price: PriceDto,
}

impl From<TeeTimeOption> for TeeTimeOptionDto {
    fn from(o: TeeTimeOption) -> Self {
        Self {
            slot_id: o.slot_id,
            start_time: o.start_time,
            start_local: o.start_local,
            duration_minutes: o.duration_minutes,
            remaining: o.remaining,
            party_sizes_allowed: o.party_sizes_allowed,
            price: o.price.into(),
        }
    }
}

/// When the snapshot was taken and how long to trust it
#[derive(Debug, Serialize, ToSchema)]
pub struct FreshnessDto {
    pub generated_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchTeeTimesResponse {
    pub venue_id: String,
    pub date: NaiveDate,
    pub options: Vec<TeeTimeOptionDto>,
    pub freshness: FreshnessDto,
}

impl From<SearchResult> for SearchTeeTimesResponse {
    fn from(r: SearchResult) -> Self {
        Self {
            venue_id: r.venue_id,
            date: r.date,
            options: r.options.into_iter().map(Into::into).collect(),
            freshness: FreshnessDto {
                generated_at: r.generated_at,
                ttl_seconds: r.ttl_seconds,
            },
        }
    }
}

// ── Reservations ────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ContactDto {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    /// E.164, e.g. "+15551234567"
    #[validate(length(min = 9, max = 16))]
    pub phone_e164: String,
}

impl From<ContactDto> for Contact {
    fn from(c: ContactDto) -> Self {
        Self {
            name: c.name.trim().to_string(),
            phone_e164: c.phone_e164.trim().to_string(),
        }
    }
}

/// Reservation as returned by every tool, with the slot's time resolved.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReservationDto {
    pub reservation_id: Uuid,
    pub confirmation_code: String,
    /// BOOKED or CANCELLED
    pub status: String,
    pub venue_id: String,
    pub slot_id: Uuid,
    pub start_time: DateTime<Utc>,
    /// Venue-local date
    pub date: NaiveDate,
    /// `HH:MM` at the venue
    pub start_local: String,
    pub party_size: i32,
    pub holes: i32,
    /// WALKING or RIDING
    pub round_type: String,
    pub customer_id: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_by_call_id: Option<String>,
    pub updated_by_call_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BookTeeTimeRequest {
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: String,
    /// Caller correlation ID, stored on the reservation and its audit entry
    #[validate(length(max = 128))]
    pub call_id: Option<String>,
    pub slot_id: Uuid,
    #[validate(nested)]
    pub primary_contact: Option<ContactDto>,
    #[validate(range(min = 1))]
    #[serde(alias = "players")]
    pub party_size: i32,
    /// 9 or 18
    #[serde(default = "default_holes", alias = "num_holes")]
    pub holes: i32,
    /// WALKING or RIDING, any case
    #[serde(alias = "reservation_type")]
    pub round_type: String,
}

fn default_holes() -> i32 {
    18
}

impl BookTeeTimeRequest {
    pub fn round_type(&self) -> LedgerResult<RoundType> {
        self.round_type.parse()
    }
}

/// Outcome of a mutation: `committed`, `replayed` or `unchanged`
#[derive(Debug, Serialize, ToSchema)]
pub struct MutationDto {
    pub confirmation_code: String,
    pub outcome: String,
    pub reservation: ReservationDto,
}

impl MutationDto {
    pub fn new(outcome: Outcome, reservation: ReservationDto) -> Self {
        Self {
            confirmation_code: reservation.confirmation_code.clone(),
            outcome: outcome.as_str().to_string(),
            reservation,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct ChangesDto {
    /// Move to this slot
    pub slot_id: Option<Uuid>,
    /// Move to the slot starting at this instant, same venue
    pub start_time: Option<DateTime<Utc>>,
    /// Move to this `HH:MM` on the same local date
    pub start_local: Option<String>,
    #[validate(range(min = 1))]
    #[serde(alias = "players")]
    pub party_size: Option<i32>,
    #[serde(alias = "reservation_type")]
    pub round_type: Option<String>,
}

impl ChangesDto {
    pub fn into_changes(self) -> LedgerResult<ReservationChanges> {
        let mut targets = Vec::new();
        if let Some(slot_id) = self.slot_id {
            targets.push(SlotTarget::Slot(slot_id));
        }
        if let Some(start_time) = self.start_time {
            targets.push(SlotTarget::StartTime(start_time));
        }
        if let Some(local) = &self.start_local {
            targets.push(SlotTarget::LocalTime(parse_local_time("changes.start_local", local)?));
        }
        if targets.len() > 1 {
            return Err(LedgerError::Validation(
                "give at most one of slot_id, start_time, start_local".into(),
            ));
        }
        Ok(ReservationChanges {
            target: targets.pop(),
            party_size: self.party_size,
            round_type: parse_round_type(self.round_type.as_deref())?,
        })
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ModifyReservationRequest {
    #[validate(length(min = 1, max = 32))]
    pub confirmation_code: String,
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: String,
    /// Caller correlation ID, stored on the reservation and its audit entry
    #[validate(length(max = 128))]
    pub call_id: Option<String>,
    #[validate(nested)]
    pub changes: ChangesDto,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CancelReservationRequest {
    #[validate(length(min = 1, max = 32))]
    pub confirmation_code: String,
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: String,
    /// Caller correlation ID, stored on the reservation and its audit entry
    #[validate(length(max = 128))]
    pub call_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancellationPolicyDto {
    pub fee_applied: bool,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CancelReservationResponse {
    pub confirmation_code: String,
    pub status: String,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub outcome: String,
    pub policy: CancellationPolicyDto,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GetReservationDetailsRequest {
    #[validate(length(min = 1, max = 32))]
    pub confirmation_code: String,
    pub call_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReservationDetailsResponse {
    pub reservation: ReservationDto,
}

// ── Quotes and capacity ─────────────────────────────────────────

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct QuoteReservationChangeRequest {
    #[validate(length(min = 1, max = 32))]
    pub confirmation_code: String,
    pub call_id: Option<String>,
    pub new_slot_id: Option<Uuid>,
    /// `HH:MM` on the reservation's local date
    pub new_start_local: Option<String>,
    #[validate(range(min = 1))]
    #[serde(alias = "new_players")]
    pub new_party_size: Option<i32>,
    #[serde(alias = "new_reservation_type")]
    pub new_round_type: Option<String>,
}

impl QuoteReservationChangeRequest {
    pub fn changes(&self) -> LedgerResult<ReservationChanges> {
        ChangesDto {
            slot_id: self.new_slot_id,
            start_time: None,
            start_local: self.new_start_local.clone(),
            party_size: self.new_party_size,
            round_type: self.new_round_type.clone(),
        }
        .into_changes()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QuoteReservationChangeResponse {
    pub can_change: bool,
    pub reason: Option<String>,
    pub capacity_ok: bool,
    pub target_slot_id: Option<Uuid>,
    pub target_start_time: Option<DateTime<Utc>>,
}

impl From<ChangeQuote> for QuoteReservationChangeResponse {
    fn from(q: ChangeQuote) -> Self {
        Self {
            can_change: q.can_change,
            reason: q.reason,
            capacity_ok: q.capacity_ok,
            target_slot_id: q.target_slot_id,
            target_start_time: q.target_start_time,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckSlotCapacityRequest {
    pub call_id: Option<String>,
    pub slot_id: Uuid,
    #[validate(range(min = 1))]
    #[serde(alias = "players")]
    pub party_size: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckSlotCapacityResponse {
    pub available: bool,
    pub capacity: i32,
    pub booked_count: i32,
    pub remaining: i32,
    pub closed: bool,
    pub start_time: DateTime<Utc>,
}

impl From<CapacityCheck> for CheckSlotCapacityResponse {
    fn from(c: CapacityCheck) -> Self {
        Self {
            available: c.can_book,
            capacity: c.capacity,
            booked_count: c.booked_count,
            remaining: c.remaining,
            closed: c.closed,
            start_time: c.start_time,
        }
    }
}
