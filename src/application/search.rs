//! Availability search
//!
//! Read-only projection over open slots. Never takes a lock; results are a
//! snapshot stamped with `generated_at` and a freshness TTL.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::ledger::SlotRepository;
use crate::domain::{LedgerStore, Slot, SlotId, SlotQuery};
use crate::shared::errors::{LedgerError, LedgerResult};
use crate::shared::time::now_utc;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Hard cap on options per search.
    pub max_results: u32,
    /// Used when the caller does not ask for a count.
    pub default_results: u32,
    pub freshness_ttl_seconds: u64,
    pub round_duration_minutes: u32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_results: 10,
            default_results: 5,
            freshness_ttl_seconds: 60,
            round_duration_minutes: 240,
        }
    }
}

/// Local wall-clock window, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_local: NaiveTime,
    pub end_local: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub venue_id: String,
    pub date: NaiveDate,
    pub time_window: Option<TimeWindow>,
    pub party_size: i32,
    pub max_results: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Price {
    pub currency: String,
    pub per_player_cents: i64,
    pub total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeeTimeOption {
    pub slot_id: SlotId,
    pub start_time: DateTime<Utc>,
    /// `HH:MM` at the venue
    pub start_local: String,
    pub duration_minutes: u32,
    pub remaining: i32,
    pub party_sizes_allowed: Vec<i32>,
    pub price: Price,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub venue_id: String,
    pub date: NaiveDate,
    pub options: Vec<TeeTimeOption>,
    pub generated_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

/// Whether one slot can take a party right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityCheck {
    pub slot_id: SlotId,
    pub start_time: DateTime<Utc>,
    pub capacity: i32,
    pub booked_count: i32,
    pub remaining: i32,
    pub closed: bool,
    pub can_book: bool,
}

pub struct AvailabilitySearch {
    store: Arc<dyn LedgerStore>,
    slots: SlotRepository,
    settings: SearchSettings,
    max_party_size: i32,
}

impl AvailabilitySearch {
    pub fn new(store: Arc<dyn LedgerStore>, settings: SearchSettings, max_party_size: i32) -> Self {
        Self {
            slots: SlotRepository::new(store.clone()),
            store,
            settings,
            max_party_size,
        }
    }

    pub async fn search(&self, query: &SearchQuery) -> LedgerResult<SearchResult> {
        if query.party_size < 1 || query.party_size > self.max_party_size {
            return Err(LedgerError::Validation(format!(
                "party_size must be between 1 and {}, got {}",
                self.max_party_size, query.party_size
            )));
        }
        let venue = self
            .store
            .venue(&query.venue_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Venue", "venue_id", &query.venue_id))?;
        let offset = venue.offset()?;

        let window = query.time_window.unwrap_or(TimeWindow {
            start_local: NaiveTime::MIN,
            end_local: NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
        });
        if window.start_local > window.end_local {
            return Err(LedgerError::Validation(
                "time_window.start_local must not be after end_local".into(),
            ));
        }

        let limit = query
            .max_results
            .unwrap_or(self.settings.default_results)
            .clamp(1, self.settings.max_results.max(1));

        let slot_query = SlotQuery {
            venue_id: venue.venue_id.clone(),
            from: local_to_utc(&offset, query.date, window.start_local)?,
            to: local_to_utc(&offset, query.date, window.end_local)?,
            min_party_size: query.party_size,
            limit: u64::from(limit),
        };
        let slots = self.slots.find_available(&slot_query).await?;
        debug!(
            venue_id = %venue.venue_id,
            date = %query.date,
            party_size = query.party_size,
            found = slots.len(),
            "Availability search"
        );
        metrics::counter!("search_requests_total").increment(1);

        let options = slots
            .iter()
            .map(|slot| self.option(slot, &offset, query.party_size))
            .collect();

        Ok(SearchResult {
            venue_id: venue.venue_id,
            date: query.date,
            options,
            generated_at: now_utc(),
            ttl_seconds: self.settings.freshness_ttl_seconds,
        })
    }

    pub async fn check_capacity(&self, slot_id: SlotId, party_size: i32) -> LedgerResult<CapacityCheck> {
        if party_size < 1 {
            return Err(LedgerError::Validation("party_size must be at least 1".into()));
        }
        let slot = self
            .store
            .slot(slot_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Slot", "slot_id", slot_id))?;
        Ok(CapacityCheck {
            slot_id,
            start_time: slot.start_time,
            capacity: slot.capacity,
            booked_count: slot.booked_count,
            remaining: slot.remaining(),
            closed: slot.closed,
            can_book: slot.can_accommodate(party_size) && party_size <= self.max_party_size,
        })
    }

    fn option(&self, slot: &Slot, offset: &FixedOffset, party_size: i32) -> TeeTimeOption {
        TeeTimeOption {
            slot_id: slot.slot_id,
            start_time: slot.start_time,
            start_local: slot.start_time.with_timezone(offset).format("%H:%M").to_string(),
            duration_minutes: self.settings.round_duration_minutes,
            remaining: slot.remaining(),
            party_sizes_allowed: slot.party_sizes_allowed(self.max_party_size),
            price: Price {
                currency: slot.currency.clone(),
                per_player_cents: slot.base_price_cents,
                total_cents: slot.base_price_cents * i64::from(party_size),
            },
        }
    }
}

fn local_to_utc(offset: &FixedOffset, date: NaiveDate, time: NaiveTime) -> LedgerResult<DateTime<Utc>> {
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| LedgerError::Validation(format!("invalid local time {date} {time}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewSlot, Venue};
    use crate::infrastructure::storage::InMemoryLedgerStore;

    async fn setup() -> (Arc<dyn LedgerStore>, AvailabilitySearch) {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::default());
        // UTC-4, like a summer east-coast course.
        store
            .upsert_venue(&Venue::new("0", "Demo Links", -240).unwrap())
            .await
            .unwrap();
        for hour in 11..=20 {
            store
                .ensure_slot(&NewSlot {
                    venue_id: "0".into(),
                    start_time: Utc.with_ymd_and_hms(2030, 6, 1, hour, 0, 0).unwrap(),
                    capacity: 4,
                    base_price_cents: if hour >= 19 { 5_000 } else { 10_000 },
                    currency: "USD".into(),
                })
                .await
                .unwrap();
        }
        let search = AvailabilitySearch::new(store.clone(), SearchSettings::default(), 4);
        (store, search)
    }

    fn query(window: Option<(u32, u32)>, max_results: Option<u32>) -> SearchQuery {
        SearchQuery {
            venue_id: "0".into(),
            date: NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(),
            time_window: window.map(|(s, e)| TimeWindow {
                start_local: NaiveTime::from_hms_opt(s, 0, 0).unwrap(),
                end_local: NaiveTime::from_hms_opt(e, 0, 0).unwrap(),
            }),
            party_size: 2,
            max_results,
        }
    }

    #[tokio::test]
    async fn window_is_read_in_venue_local_time() {
        let (_, search) = setup().await;
        let result = search.search(&query(Some((8, 10)), None)).await.unwrap();

        let starts: Vec<_> = result.options.iter().map(|o| o.start_local.as_str()).collect();
        assert_eq!(starts, vec!["08:00", "09:00", "10:00"]);
        assert_eq!(
            result.options[0].start_time,
            Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(result.ttl_seconds, 60);
    }

    #[tokio::test]
    async fn results_are_capped() {
        let (_, search) = setup().await;
        assert_eq!(search.search(&query(None, None)).await.unwrap().options.len(), 5);
        assert_eq!(search.search(&query(None, Some(50))).await.unwrap().options.len(), 10);
        assert_eq!(search.search(&query(None, Some(2))).await.unwrap().options.len(), 2);
    }

    #[tokio::test]
    async fn option_carries_price_and_allowed_sizes() {
        let (_, search) = setup().await;
        let result = search.search(&query(Some((15, 15)), None)).await.unwrap();
        let option = &result.options[0];
        assert_eq!(option.price.per_player_cents, 5_000);
        assert_eq!(option.price.total_cents, 10_000);
        assert_eq!(option.party_sizes_allowed, vec![1, 2, 3, 4]);
        assert_eq!(option.duration_minutes, 240);
    }

    #[tokio::test]
    async fn full_and_closed_slots_are_hidden() {
        let (store, search) = setup().await;
        let first = search.search(&query(Some((7, 7)), None)).await.unwrap().options[0].clone();
        store.set_slot_closed(first.slot_id, true).await.unwrap();
        assert!(search
            .search(&query(Some((7, 7)), None))
            .await
            .unwrap()
            .options
            .is_empty());
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let (_, search) = setup().await;
        assert!(matches!(
            search.search(&query(Some((10, 8)), None)).await,
            Err(LedgerError::Validation(_))
        ));
        let mut unknown = query(None, None);
        unknown.venue_id = "nope".into();
        assert!(matches!(
            search.search(&unknown).await,
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn check_capacity_reports_room() {
        let (_, search) = setup().await;
        let slot = search.search(&query(Some((8, 8)), None)).await.unwrap().options[0].slot_id;
        let check = search.check_capacity(slot, 4).await.unwrap();
        assert!(check.can_book);
        assert_eq!(check.remaining, 4);
        assert!(!search.check_capacity(slot, 5).await.unwrap().can_book);
    }
}
