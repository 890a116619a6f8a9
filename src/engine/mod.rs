mod availability;
mod conflict;
mod error;
mod matcher;
mod mutations;
mod queries;
mod store;
#[cfg(test)]
mod tests;

pub use availability::{drop_started, group, scan};
pub use conflict::{find_conflict, has_conflict};
pub use error::EngineError;
pub use matcher::best_fit;
pub use store::{SharedDay, Store};

use std::io;
use std::path::PathBuf;

use chrono::NaiveDate;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedRwLockWriteGuard, RwLock};

use crate::model::*;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            commit_batch(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                if !batch.is_empty() {
                    commit_batch(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even on append error so buffered bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The allocation engine: table roster, reservation ledger and the
/// overlap/matching/availability logic on top of them.
///
/// Every write to a date's schedule happens under that date's write lock, so
/// match-and-create, confirm, reject and cancel on one date are serialised.
pub struct Engine {
    pub store: Store,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Serialises roster changes (id assignment, seat/status updates).
    pub(super) roster_lock: Mutex<()>,
    /// Writers hold it shared, taken before any day lock; compaction holds it exclusively.
    pub(super) write_gate: RwLock<()>,
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: Store::new(),
            wal_tx,
            roster_lock: Mutex::new(()),
            write_gate: RwLock::new(()),
        };

        // Sole owner of every day lock during replay, so try_write always succeeds.
        // Never blocking_write here: this may run inside an async context.
        for event in &events {
            match event_date(event) {
                Some(date) => {
                    let day = engine.store.day_or_create(date);
                    let mut guard = day.try_write().expect("replay: uncontended write");
                    engine.store.apply_to_day(&mut guard, event);
                }
                None => engine.store.apply_table_event(event),
            }
        }

        tracing::info!(
            "engine ready: {} events replayed, {} tables",
            events.len(),
            engine.store.table_count()
        );
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    /// WAL-append, then apply to the locked day. State is untouched if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        day: &mut DaySchedule,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_to_day(day, event);
        Ok(())
    }

    pub(super) async fn persist_table_event(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_table_event(event);
        Ok(())
    }

    /// Lookup reservation → date, acquire that day's write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        id: ReservationId,
    ) -> Result<OwnedRwLockWriteGuard<DaySchedule>, EngineError> {
        let date = self.store.date_of(id).ok_or(EngineError::NotFound(id))?;
        let day = self.store.day(&date).ok_or(EngineError::NotFound(id))?;
        Ok(day.write_owned().await)
    }
}

/// The date a reservation event belongs to; `None` for roster events.
fn event_date(event: &Event) -> Option<NaiveDate> {
    match event {
        Event::ReservationCreated { date, .. } | Event::ReservationStatusChanged { date, .. } => {
            Some(*date)
        }
        Event::TableAdded { .. } | Event::TableUpdated { .. } => None,
    }
}
