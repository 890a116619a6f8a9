use std::cmp::Reverse;

use chrono::NaiveDate;

use crate::clock::{self, booking_window};
use crate::model::*;

use super::availability::{group, scan};
use super::conflict::{find_conflict, validate_guests, validate_time};
use super::matcher::best_fit;
use super::{Engine, EngineError};

impl Engine {
    pub fn tables(&self) -> Vec<Table> {
        self.store.tables_snapshot()
    }

    pub async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        let date = self.store.date_of(id).ok_or(EngineError::NotFound(id))?;
        let day = self.store.day(&date).ok_or(EngineError::NotFound(id))?;
        let guard = day.read().await;
        guard.get(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Does an active reservation on `table_id` intersect a booking starting at `time` on `date`?
    pub async fn conflict_on(
        &self,
        table_id: TableId,
        date: NaiveDate,
        time: Minute,
    ) -> Result<Option<ReservationId>, EngineError> {
        validate_time(time)?;
        let Some(day) = self.store.day(&date) else {
            return Ok(None);
        };
        let guard = day.read().await;
        Ok(find_conflict(&guard, table_id, &booking_window(time)))
    }

    /// Best-fit table for a party at `time` on `date`. Read-only: nothing is claimed.
    pub async fn match_table(
        &self,
        date: NaiveDate,
        time: Minute,
        guests: u32,
    ) -> Result<TableId, EngineError> {
        validate_guests(guests)?;
        validate_time(time)?;
        let tables = self.store.tables_snapshot();
        let window = booking_window(time);
        let found = match self.store.day(&date) {
            Some(day) => {
                let guard = day.read().await;
                best_fit(&tables, &guard, guests, &window)
            }
            None => best_fit(&tables, &DaySchedule::new(date), guests, &window),
        };
        found.ok_or(EngineError::NoAvailableTable)
    }

    /// [`Engine::match_table`] on raw `YYYY-MM-DD` / `HH:MM` input.
    pub async fn find_table(&self, date: &str, time: &str, guests: u32) -> Result<TableId, EngineError> {
        let date = clock::parse_date(date)?;
        let time = clock::parse_time(time)?;
        self.match_table(date, time, guests).await
    }

    /// Catalog slots with a free best-fit table, in catalog order.
    pub async fn scan_slots(&self, date: NaiveDate, guests: u32) -> Result<Vec<Minute>, EngineError> {
        validate_guests(guests)?;
        let tables = self.store.tables_snapshot();
        Ok(match self.store.day(&date) {
            Some(day) => {
                let guard = day.read().await;
                scan(&tables, &guard, guests)
            }
            None => scan(&tables, &DaySchedule::new(date), guests),
        })
    }

    pub async fn available_slots(&self, date: &str, guests: u32) -> Result<AvailableSlots, EngineError> {
        let date = clock::parse_date(date)?;
        let found = self.scan_slots(date, guests).await?;
        Ok(group(&found))
    }

    /// Reservations made with `email`, newest date and time first.
    pub async fn list_by_email(&self, email: &str) -> Vec<Reservation> {
        self.collect_reservations(|r| r.email == email).await
    }

    /// Every reservation, newest date and time first.
    pub async fn list_all(&self) -> Vec<Reservation> {
        self.collect_reservations(|_| true).await
    }

    async fn collect_reservations(&self, keep: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        let mut out = Vec::new();
        for day in self.store.days() {
            let guard = day.read().await;
            out.extend(guard.reservations.iter().filter(|r| keep(r)).cloned());
        }
        out.sort_by_key(|r| Reverse((r.date, r.time, r.id)));
        out
    }

    /// Dashboard counters, with `today` supplied by the caller.
    pub async fn stats_on(&self, today: NaiveDate) -> AdminStats {
        let today_count = match self.store.day(&today) {
            Some(day) => day.read().await.reservations.len(),
            None => 0,
        };
        let mut pending_count = 0;
        for day in self.store.days() {
            let guard = day.read().await;
            pending_count += guard
                .reservations
                .iter()
                .filter(|r| r.status == ReservationStatus::Pending)
                .count();
        }
        let available_table_count = self
            .store
            .tables_snapshot()
            .iter()
            .filter(|t| t.is_available())
            .count();
        AdminStats {
            today_count,
            pending_count,
            available_table_count,
        }
    }
}
