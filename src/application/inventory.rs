//! Inventory seeding and slot open/close
//!
//! A `SeedPlan` lays out a daily tee sheet in venue-local time and converts
//! it to UTC slots. Seeding is idempotent: slots are unique by venue and
//! start time, and existing ones keep their booked counts and closed flags.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{LedgerStore, NewSlot, Slot, SlotId, Venue};
use crate::shared::errors::{LedgerError, LedgerResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedPlan {
    pub venue_id: String,
    pub venue_name: String,
    pub utc_offset_minutes: i32,
    pub first_tee_hour: u32,
    /// Last tee time starts at this hour, on the hour.
    pub last_tee_hour: u32,
    pub interval_minutes: u32,
    pub forward_days: u32,
    pub capacity: i32,
    pub regular_price_cents: i64,
    pub twilight_price_cents: i64,
    pub twilight_start_hour: u32,
    pub currency: String,
}

impl Default for SeedPlan {
    fn default() -> Self {
        Self {
            venue_id: "0".to_string(),
            venue_name: "Demo Links".to_string(),
            utc_offset_minutes: -300,
            first_tee_hour: 7,
            last_tee_hour: 15,
            interval_minutes: 12,
            forward_days: 14,
            capacity: 4,
            regular_price_cents: 10_000,
            twilight_price_cents: 5_000,
            twilight_start_hour: 15,
            currency: "USD".to_string(),
        }
    }
}

impl SeedPlan {
    pub fn validate(&self) -> LedgerResult<()> {
        let invalid = |msg: &str| Err(LedgerError::Validation(msg.to_string()));
        if self.first_tee_hour > 23 || self.last_tee_hour > 23 || self.twilight_start_hour > 23 {
            return invalid("hours must be between 0 and 23");
        }
        if self.last_tee_hour < self.first_tee_hour {
            return invalid("last_tee_hour must be >= first_tee_hour");
        }
        if self.interval_minutes == 0 {
            return invalid("interval_minutes must be > 0");
        }
        if self.forward_days == 0 {
            return invalid("forward_days must be > 0");
        }
        if self.capacity <= 0 {
            return invalid("capacity must be > 0");
        }
        if self.regular_price_cents < 0 || self.twilight_price_cents < 0 {
            return invalid("prices must be >= 0");
        }
        if self.currency.len() != 3 {
            return invalid("currency must be a three-letter code");
        }
        self.venue().map(|_| ())
    }

    pub fn venue(&self) -> LedgerResult<Venue> {
        Venue::new(&self.venue_id, &self.venue_name, self.utc_offset_minutes)
    }

    /// Minutes after local midnight of every tee time in a day.
    fn minutes_of_day(&self) -> impl Iterator<Item = u32> {
        let end = self.last_tee_hour * 60;
        (self.first_tee_hour * 60..=end).step_by(self.interval_minutes.max(1) as usize)
    }

    fn price_at(&self, minute_of_day: u32) -> i64 {
        if minute_of_day < self.twilight_start_hour * 60 {
            self.regular_price_cents
        } else {
            self.twilight_price_cents
        }
    }

    /// Slots for the `forward_days` days after `local_today`.
    pub fn slots(&self, local_today: NaiveDate) -> LedgerResult<Vec<NewSlot>> {
        self.validate()?;
        let offset = self.venue()?.offset()?;

        let mut slots = Vec::new();
        for day in 1..=i64::from(self.forward_days) {
            let date = local_today + Duration::days(day);
            for minute in self.minutes_of_day() {
                let time = NaiveTime::from_hms_opt(minute / 60, minute % 60, 0)
                    .ok_or_else(|| LedgerError::Validation(format!("bad minute of day {minute}")))?;
                let start = offset
                    .from_local_datetime(&date.and_time(time))
                    .single()
                    .ok_or_else(|| LedgerError::Validation(format!("bad local time {date} {time}")))?;
                slots.push(NewSlot {
                    venue_id: self.venue_id.clone(),
                    start_time: start.with_timezone(&Utc),
                    capacity: self.capacity,
                    base_price_cents: self.price_at(minute),
                    currency: self.currency.clone(),
                });
            }
        }
        Ok(slots)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub venue_id: String,
    pub created: usize,
    pub existing: usize,
}

pub struct InventoryService {
    store: Arc<dyn LedgerStore>,
}

impl InventoryService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Seed relative to the venue's current local date.
    pub async fn seed(&self, plan: &SeedPlan) -> LedgerResult<SeedReport> {
        let offset = plan.venue()?.offset()?;
        let today = Utc::now().with_timezone(&offset).date_naive();
        self.seed_from(plan, today).await
    }

    pub async fn seed_from(&self, plan: &SeedPlan, local_today: NaiveDate) -> LedgerResult<SeedReport> {
        let slots = plan.slots(local_today)?;
        self.store.upsert_venue(&plan.venue()?).await?;

        let mut report = SeedReport {
            venue_id: plan.venue_id.clone(),
            ..SeedReport::default()
        };
        for slot in &slots {
            let (_, created) = self.store.ensure_slot(slot).await?;
            if created {
                report.created += 1;
            } else {
                report.existing += 1;
            }
        }
        info!(
            venue_id = %report.venue_id,
            created = report.created,
            existing = report.existing,
            "🌱 Inventory seeded"
        );
        Ok(report)
    }

    pub async fn close_slot(&self, slot_id: SlotId) -> LedgerResult<Slot> {
        let slot = self.store.set_slot_closed(slot_id, true).await?;
        info!(%slot_id, "Slot closed");
        Ok(slot)
    }

    pub async fn reopen_slot(&self, slot_id: SlotId) -> LedgerResult<Slot> {
        let slot = self.store.set_slot_closed(slot_id, false).await?;
        info!(%slot_id, "Slot reopened");
        Ok(slot)
    }
}
