use chrono::NaiveDate;
use tokio::sync::oneshot;

use crate::clock::{booking_window, format_time};
use crate::limits::*;
use crate::model::*;

use super::conflict::{validate_contact, validate_guests, validate_time};
use super::matcher::best_fit;
use super::{Engine, EngineError, WalCommand};

impl Engine {
    // ── Table roster ─────────────────────────────────────────

    pub async fn add_table(&self, seats: u32) -> Result<TableId, EngineError> {
        let _gate = self.write_gate.read().await;
        let _roster = self.roster_lock.lock().await;
        self.insert_table(seats).await
    }

    /// Seed the roster from `(seats, count)` groups, in order. No-op when any table exists.
    pub async fn seed_tables(&self, layout: &[(u32, usize)]) -> Result<Vec<TableId>, EngineError> {
        let _gate = self.write_gate.read().await;
        let _roster = self.roster_lock.lock().await;
        if self.store.table_count() > 0 {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for &(seats, count) in layout {
            for _ in 0..count {
                ids.push(self.insert_table(seats).await?);
            }
        }
        Ok(ids)
    }

    /// Caller holds the write gate and the roster lock.
    async fn insert_table(&self, seats: u32) -> Result<TableId, EngineError> {
        if seats == 0 || seats > MAX_TABLE_SEATS {
            return Err(EngineError::LimitExceeded("table seats out of range"));
        }
        if self.store.table_count() >= MAX_TABLES {
            return Err(EngineError::LimitExceeded("too many tables"));
        }
        let id = self.store.next_table_id();
        let event = Event::TableAdded {
            id,
            seats,
            status: TableStatus::Available,
        };
        self.persist_table_event(&event).await?;
        tracing::info!("table {id} added with {seats} seats");
        Ok(id)
    }

    /// Existing reservations on the table are left untouched.
    pub async fn set_table_status(&self, id: TableId, status: TableStatus) -> Result<Table, EngineError> {
        let _gate = self.write_gate.read().await;
        let _roster = self.roster_lock.lock().await;
        let table = self.store.get_table(id).ok_or(EngineError::TableNotFound(id))?;
        let event = Event::TableUpdated {
            id,
            seats: table.seats,
            status,
        };
        self.persist_table_event(&event).await?;
        tracing::info!("table {id} is now {status}");
        Ok(Table { status, ..table })
    }

    pub async fn set_table_seats(&self, id: TableId, seats: u32) -> Result<Table, EngineError> {
        if seats == 0 || seats > MAX_TABLE_SEATS {
            return Err(EngineError::LimitExceeded("table seats out of range"));
        }
        let _gate = self.write_gate.read().await;
        let _roster = self.roster_lock.lock().await;
        let table = self.store.get_table(id).ok_or(EngineError::TableNotFound(id))?;
        let event = Event::TableUpdated {
            id,
            seats,
            status: table.status,
        };
        self.persist_table_event(&event).await?;
        Ok(Table { seats, ..table })
    }

    // ── Reservation ledger ───────────────────────────────────

    /// Insert a `pending` reservation on a caller-chosen table.
    ///
    /// No conflict check: use [`Engine::book`] to find and claim a table in one step.
    pub async fn create_reservation(
        &self,
        name: String,
        email: String,
        table_id: TableId,
        date: NaiveDate,
        time: Minute,
        guests: u32,
    ) -> Result<ReservationId, EngineError> {
        validate_guests(guests)?;
        validate_time(time)?;
        validate_contact(&name, &email)?;
        let table = self
            .store
            .get_table(table_id)
            .ok_or(EngineError::TableNotFound(table_id))?;
        if guests > table.seats {
            return Err(EngineError::InvalidGuests(guests));
        }

        let _gate = self.write_gate.read().await;
        let day = self.store.day_or_create(date);
        let result = {
            let mut guard = day.write().await;
            self.insert_pending(&mut guard, table_id, name, email, time, guests)
                .await
        };
        if result.is_err() {
            drop(day);
            self.store.discard_if_empty(date);
        }
        result.map(|r| r.id)
    }

    /// Find a best-fit free table and claim it, atomically with respect to every
    /// other write on the same date.
    pub async fn book(
        &self,
        name: String,
        email: String,
        date: NaiveDate,
        time: Minute,
        guests: u32,
    ) -> Result<Reservation, EngineError> {
        validate_guests(guests)?;
        validate_time(time)?;
        validate_contact(&name, &email)?;

        let _gate = self.write_gate.read().await;
        let day = self.store.day_or_create(date);
        let result = {
            let mut guard = day.write().await;
            let tables = self.store.tables_snapshot();
            let found = best_fit(&tables, &guard, guests, &booking_window(time));
            match found {
                Some(table_id) => {
                    self.insert_pending(&mut guard, table_id, name, email, time, guests)
                        .await
                }
                None => Err(EngineError::NoAvailableTable),
            }
        };
        // a refused booking leaves no schedule behind
        if result.is_err() {
            drop(day);
            self.store.discard_if_empty(date);
        }
        result
    }

    /// Caller holds the write gate and the day's write lock.
    async fn insert_pending(
        &self,
        day: &mut DaySchedule,
        table_id: TableId,
        name: String,
        email: String,
        time: Minute,
        guests: u32,
    ) -> Result<Reservation, EngineError> {
        if day.reservations.len() >= MAX_RESERVATIONS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many reservations on date"));
        }
        let id = self.store.allocate_reservation_id();
        let date = day.date;
        let event = Event::ReservationCreated {
            id,
            table_id,
            date,
            time,
            guests,
            name,
            email,
        };
        self.persist_and_apply(day, &event).await?;
        tracing::info!("reservation {id} created: table {table_id}, {date} {}", format_time(time));
        day.get(id).cloned().ok_or(EngineError::NotFound(id))
    }

    pub async fn confirm(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Confirmed).await
    }

    pub async fn reject(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Rejected).await
    }

    pub async fn cancel(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Canceled).await
    }

    /// Move a `pending` reservation to `target`. Every other state is terminal.
    async fn transition(
        &self,
        id: ReservationId,
        target: ReservationStatus,
    ) -> Result<Reservation, EngineError> {
        let _gate = self.write_gate.read().await;
        let mut guard = self.resolve_reservation_write(id).await?;
        let status = guard.get(id).ok_or(EngineError::NotFound(id))?.status;
        if status.is_terminal() {
            return Err(EngineError::AlreadyFinalized { id, status });
        }

        let event = Event::ReservationStatusChanged {
            id,
            date: guard.date,
            status: target,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!("reservation {id} is now {target}");
        guard.get(id).cloned().ok_or(EngineError::NotFound(id))
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // No write may append between the snapshot and the swap.
        let _gate = self.write_gate.write().await;
        let mut guards = Vec::new();
        for day in self.store.days() {
            guards.push(day.read_owned().await);
        }

        let mut events: Vec<Event> = self
            .store
            .tables_snapshot()
            .into_iter()
            .map(|t| Event::TableAdded {
                id: t.id,
                seats: t.seats,
                status: t.status,
            })
            .collect();

        let mut reservations: Vec<&Reservation> =
            guards.iter().flat_map(|g| g.reservations.iter()).collect();
        reservations.sort_by_key(|r| r.id);
        for r in reservations {
            events.push(Event::ReservationCreated {
                id: r.id,
                table_id: r.table_id,
                date: r.date,
                time: r.time,
                guests: r.guests,
                name: r.name.clone(),
                email: r.email.clone(),
            });
            if r.status != ReservationStatus::Pending {
                events.push(Event::ReservationStatusChanged {
                    id: r.id,
                    date: r.date,
                    status: r.status,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

