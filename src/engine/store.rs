use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::model::*;

pub type SharedDay = Arc<RwLock<DaySchedule>>;

/// In-memory system of record: the table roster plus one lock-guarded
/// schedule per calendar date.
pub struct Store {
    tables: DashMap<TableId, Table>,
    days: DashMap<NaiveDate, SharedDay>,
    /// Reverse lookup: reservation id → date of its schedule.
    reservation_dates: DashMap<ReservationId, NaiveDate>,
    next_reservation_id: AtomicU64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            days: DashMap::new(),
            reservation_dates: DashMap::new(),
            next_reservation_id: AtomicU64::new(1),
        }
    }

    // ── Tables ───────────────────────────────────────────────

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn get_table(&self, id: TableId) -> Option<Table> {
        self.tables.get(&id).map(|e| *e.value())
    }

    /// Copy of the roster, ordered by id.
    pub fn tables_snapshot(&self) -> Vec<Table> {
        let mut tables: Vec<Table> = self.tables.iter().map(|e| *e.value()).collect();
        tables.sort_by_key(|t| t.id);
        tables
    }

    pub fn next_table_id(&self) -> TableId {
        self.tables.iter().map(|e| *e.key()).max().unwrap_or(0) + 1
    }

    // ── Day schedules ────────────────────────────────────────

    pub fn day(&self, date: &NaiveDate) -> Option<SharedDay> {
        self.days.get(date).map(|e| e.value().clone())
    }

    pub fn day_or_create(&self, date: NaiveDate) -> SharedDay {
        self.days
            .entry(date)
            .or_insert_with(|| Arc::new(RwLock::new(DaySchedule::new(date))))
            .value()
            .clone()
    }

    pub fn days(&self) -> Vec<SharedDay> {
        self.days.iter().map(|e| e.value().clone()).collect()
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    /// Remove the schedule for `date` if it is empty and no one else holds it.
    ///
    /// Every handle is cloned under the map's shard lock, which `remove_if` holds
    /// for the check, so a sole owner cannot race with a new one.
    pub fn discard_if_empty(&self, date: NaiveDate) -> bool {
        self.days
            .remove_if(&date, |_, day| {
                Arc::strong_count(day) == 1
                    && day.try_read().is_ok_and(|g| g.reservations.is_empty())
            })
            .is_some()
    }

    // ── Reservation index ────────────────────────────────────

    pub fn date_of(&self, id: ReservationId) -> Option<NaiveDate> {
        self.reservation_dates.get(&id).map(|e| *e.value())
    }

    pub fn allocate_reservation_id(&self) -> ReservationId {
        self.next_reservation_id.fetch_add(1, Ordering::Relaxed)
    }

    // ── Event application ────────────────────────────────────

    /// Apply a roster event. Reservation events are ignored here.
    pub fn apply_table_event(&self, event: &Event) {
        match event {
            Event::TableAdded { id, seats, status } | Event::TableUpdated { id, seats, status } => {
                self.tables.insert(
                    *id,
                    Table {
                        id: *id,
                        seats: *seats,
                        status: *status,
                    },
                );
            }
            Event::ReservationCreated { .. } | Event::ReservationStatusChanged { .. } => {}
        }
    }

    /// Apply a reservation event to its day (no locking; caller holds the write lock).
    pub fn apply_to_day(&self, day: &mut DaySchedule, event: &Event) {
        match event {
            Event::ReservationCreated {
                id,
                table_id,
                date,
                time,
                guests,
                name,
                email,
            } => {
                day.insert(Reservation {
                    id: *id,
                    name: name.clone(),
                    email: email.clone(),
                    table_id: *table_id,
                    date: *date,
                    time: *time,
                    guests: *guests,
                    status: ReservationStatus::Pending,
                });
                self.reservation_dates.insert(*id, *date);
                self.next_reservation_id.fetch_max(id + 1, Ordering::Relaxed);
            }
            Event::ReservationStatusChanged { id, status, .. } => {
                if let Some(r) = day.get_mut(*id) {
                    r.status = *status;
                }
            }
            Event::TableAdded { .. } | Event::TableUpdated { .. } => {}
        }
    }
}
