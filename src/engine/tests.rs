use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::*;
use crate::model::*;
use crate::slots;

const SEED_LAYOUT: [(u32, usize); 3] = [(2, 4), (4, 4), (6, 1)];

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("tablebook_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 6, d).unwrap()
}

async fn seeded_engine(name: &str) -> Engine {
    let engine = Engine::new(test_wal_path(name)).unwrap();
    engine.seed_tables(&SEED_LAYOUT).await.unwrap();
    engine
}

async fn book(engine: &Engine, date: NaiveDate, time: Minute, guests: u32) -> Result<Reservation, EngineError> {
    engine
        .book("Ada Lovelace".into(), "ada@example.com".into(), date, time, guests)
        .await
}

/// Active reservations sharing a table and date never overlap, and always fit the table.
async fn assert_schedule_sound(engine: &Engine) {
    let all = engine.list_all().await;
    let tables = engine.tables();
    let active: Vec<&Reservation> = all.iter().filter(|r| r.status.is_active()).collect();
    for (i, a) in active.iter().enumerate() {
        let table = tables.iter().find(|t| t.id == a.table_id).unwrap();
        assert!(a.guests <= table.seats, "reservation {} overfills table {}", a.id, table.id);
        for b in &active[i + 1..] {
            if a.table_id == b.table_id && a.date == b.date {
                assert!(
                    !a.window().overlaps(&b.window()),
                    "reservations {} and {} overlap on table {} {}",
                    a.id,
                    b.id,
                    a.table_id,
                    a.date
                );
            }
        }
    }
}

// ── Roster ───────────────────────────────────────────────

#[tokio::test]
async fn seeding_runs_once() {
    let engine = Engine::new(test_wal_path("seed_once.wal")).unwrap();
    let ids = engine.seed_tables(&SEED_LAYOUT).await.unwrap();
    assert_eq!(ids, (1..=9).collect::<Vec<_>>());

    let seats: Vec<u32> = engine.tables().iter().map(|t| t.seats).collect();
    assert_eq!(seats, vec![2, 2, 2, 2, 4, 4, 4, 4, 6]);
    assert!(engine.tables().iter().all(|t| t.is_available()));

    assert!(engine.seed_tables(&SEED_LAYOUT).await.unwrap().is_empty());
    assert_eq!(engine.tables().len(), 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_seeding_seeds_once() {
    let engine = Arc::new(Engine::new(test_wal_path("seed_race.wal")).unwrap());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.seed_tables(&SEED_LAYOUT).await.unwrap() }));
    }
    let mut seeded = Vec::new();
    for h in handles {
        seeded.push(h.await.unwrap().len());
    }
    seeded.sort();
    assert_eq!(seeded, vec![0, 0, 0, 0, 0, 0, 0, 9]);
    assert_eq!(engine.tables().len(), 9);
}

#[tokio::test]
async fn table_seats_are_bounded() {
    let engine = Engine::new(test_wal_path("seat_bounds.wal")).unwrap();
    assert!(matches!(engine.add_table(0).await, Err(EngineError::LimitExceeded(_))));
    assert!(matches!(engine.add_table(51).await, Err(EngineError::LimitExceeded(_))));
    assert_eq!(engine.add_table(8).await.unwrap(), 1);
    assert!(matches!(
        engine.set_table_seats(1, 0).await,
        Err(EngineError::LimitExceeded(_))
    ));
    assert_eq!(
        engine.set_table_seats(7, 4).await,
        Err(EngineError::TableNotFound(7))
    );
}

#[tokio::test]
async fn unavailable_table_is_skipped_but_keeps_reservations() {
    let engine = seeded_engine("unavailable.wal").await;
    let r = book(&engine, day(1), 1200, 6).await.unwrap();
    assert_eq!(r.table_id, 9);

    let t = engine.set_table_status(9, TableStatus::Unavailable).await.unwrap();
    assert_eq!(t.status, TableStatus::Unavailable);
    assert_eq!(book(&engine, day(2), 1200, 6).await, Err(EngineError::NoAvailableTable));

    // the existing reservation is untouched
    assert_eq!(engine.get_reservation(r.id).await.unwrap().status, ReservationStatus::Pending);

    engine.set_table_status(9, TableStatus::Available).await.unwrap();
    assert_eq!(book(&engine, day(2), 1200, 6).await.unwrap().table_id, 9);
}

// ── Matching ─────────────────────────────────────────────

#[tokio::test]
async fn book_picks_smallest_fitting_table() {
    let engine = seeded_engine("best_fit.wal").await;
    assert_eq!(book(&engine, day(1), 1200, 2).await.unwrap().table_id, 1);
    assert_eq!(book(&engine, day(1), 1200, 2).await.unwrap().table_id, 2);
    assert_eq!(book(&engine, day(1), 1200, 3).await.unwrap().table_id, 5);
    assert_eq!(book(&engine, day(1), 1200, 5).await.unwrap().table_id, 9);
    // a different, non-overlapping time reuses table 1
    assert_eq!(book(&engine, day(1), 720, 1).await.unwrap().table_id, 1);
}

#[tokio::test]
async fn larger_tables_absorb_overflow() {
    let engine = seeded_engine("overflow.wal").await;
    let mut tables = Vec::new();
    for _ in 0..5 {
        tables.push(book(&engine, day(1), 1200, 4).await.unwrap().table_id);
    }
    assert_eq!(tables, vec![5, 6, 7, 8, 9]);
    assert_eq!(book(&engine, day(1), 1200, 4).await, Err(EngineError::NoAvailableTable));
    // two-seaters are still free
    assert_eq!(book(&engine, day(1), 1200, 2).await.unwrap().table_id, 1);
}

#[tokio::test]
async fn match_table_claims_nothing() {
    let engine = seeded_engine("match_only.wal").await;
    assert_eq!(engine.match_table(day(1), 1200, 4).await.unwrap(), 5);
    assert_eq!(engine.match_table(day(1), 1200, 4).await.unwrap(), 5);
    assert!(engine.list_all().await.is_empty());
    assert_eq!(engine.find_table("2030-06-01", "20:00", 2).await.unwrap(), 1);
}

#[tokio::test]
async fn raw_input_errors() {
    let engine = seeded_engine("raw_input.wal").await;
    assert!(matches!(
        engine.find_table("2030-13-01", "20:00", 2).await,
        Err(EngineError::InvalidDateFormat(_))
    ));
    assert!(matches!(
        engine.find_table("2030-06-01", "8pm", 2).await,
        Err(EngineError::InvalidTimeFormat(_))
    ));
    assert_eq!(
        engine.find_table("2030-06-01", "20:00", 0).await,
        Err(EngineError::InvalidGuests(0))
    );
    assert!(matches!(
        engine.available_slots("tomorrow", 2).await,
        Err(EngineError::InvalidDateFormat(_))
    ));
}

#[tokio::test]
async fn times_past_the_day_are_rejected() {
    let engine = seeded_engine("out_of_day.wal").await;
    for time in [MINUTES_PER_DAY, 1500] {
        assert!(matches!(
            engine.match_table(day(1), time, 2).await,
            Err(EngineError::InvalidTimeFormat(_))
        ));
        assert!(matches!(
            book(&engine, day(1), time, 2).await,
            Err(EngineError::InvalidTimeFormat(_))
        ));
        assert!(matches!(
            engine
                .create_reservation("A".into(), "a@example.com".into(), 1, day(1), time, 2)
                .await,
            Err(EngineError::InvalidTimeFormat(_))
        ));
        assert!(matches!(
            engine.conflict_on(1, day(1), time).await,
            Err(EngineError::InvalidTimeFormat(_))
        ));
    }
    // the last minute of the day is still bookable
    assert_eq!(book(&engine, day(1), 1439, 2).await.unwrap().table_id, 1);
    assert_eq!(engine.list_all().await.len(), 1);
}

#[tokio::test]
async fn refused_bookings_leave_no_schedule() {
    let engine = seeded_engine("no_empty_days.wal").await;
    for d in 1..=20 {
        assert_eq!(book(&engine, day(d), 1200, 7).await, Err(EngineError::NoAvailableTable));
    }
    assert_eq!(
        engine
            .create_reservation("A".into(), "a@example.com".into(), 9, day(21), 1200, 7)
            .await,
        Err(EngineError::InvalidGuests(7))
    );
    assert_eq!(engine.store.day_count(), 0);

    book(&engine, day(1), 1200, 2).await.unwrap();
    assert_eq!(book(&engine, day(1), 1200, 7).await, Err(EngineError::NoAvailableTable));
    assert_eq!(engine.store.day_count(), 1);
    assert_eq!(engine.list_all().await.len(), 1);
}

// ── Overlap and midnight ─────────────────────────────────

#[tokio::test]
async fn touching_windows_do_not_conflict() {
    let engine = seeded_engine("touch.wal").await;
    let id = engine
        .create_reservation("A".into(), "a@example.com".into(), 1, day(1), 720, 2)
        .await
        .unwrap();
    assert_eq!(engine.conflict_on(1, day(1), 750).await.unwrap(), Some(id));
    assert_eq!(engine.conflict_on(1, day(1), 840).await.unwrap(), None);
    assert_eq!(engine.conflict_on(2, day(1), 720).await.unwrap(), None);
}

#[tokio::test]
async fn late_booking_runs_to_midnight() {
    let engine = seeded_engine("midnight.wal").await;
    let id = engine
        .create_reservation("A".into(), "a@example.com".into(), 1, day(1), 1320, 2)
        .await
        .unwrap();
    let r = engine.get_reservation(id).await.unwrap();
    assert_eq!(r.window(), Window::new(1320, MINUTES_PER_DAY));

    assert_eq!(engine.conflict_on(1, day(1), 1320).await.unwrap(), Some(id));
    assert_eq!(engine.conflict_on(1, day(1), 1319).await.unwrap(), Some(id));
    // the window does not spill into the next date
    assert_eq!(engine.conflict_on(1, day(2), 720).await.unwrap(), None);
    assert_eq!(engine.conflict_on(1, day(2), 0).await.unwrap(), None);
}

#[tokio::test]
async fn create_reservation_checks_table() {
    let engine = seeded_engine("create_checks.wal").await;
    assert_eq!(
        engine
            .create_reservation("A".into(), "a@example.com".into(), 99, day(1), 720, 2)
            .await,
        Err(EngineError::TableNotFound(99))
    );
    assert_eq!(
        engine
            .create_reservation("A".into(), "a@example.com".into(), 1, day(1), 720, 3)
            .await,
        Err(EngineError::InvalidGuests(3))
    );
    assert!(matches!(
        engine
            .create_reservation("A".into(), "x".repeat(300), 1, day(1), 720, 2)
            .await,
        Err(EngineError::LimitExceeded(_))
    ));
}

// ── Availability ─────────────────────────────────────────

#[tokio::test]
async fn empty_day_offers_every_slot() {
    let engine = seeded_engine("all_slots.wal").await;
    let slots = engine.available_slots("2030-06-01", 4).await.unwrap();
    assert_eq!(slots.len(), 13);
    assert_eq!(slots.lunch.len(), slots::LUNCH_SLOTS.len());
    assert_eq!(slots.dinner.len(), slots::DINNER_SLOTS.len());
    assert_eq!(slots.lunch[0], "12:00");
    assert_eq!(slots.dinner[6], "22:00");
}

#[tokio::test]
async fn exhausted_slot_disappears_for_that_party_size() {
    let engine = seeded_engine("exhausted.wal").await;
    for _ in 0..5 {
        book(&engine, day(1), 1200, 4).await.unwrap();
    }
    let four = engine.available_slots("2030-06-01", 4).await.unwrap();
    assert!(!four.contains("20:00"));
    assert_eq!(four.lunch.len(), 6);
    // every dinner slot except 22:00 overlaps [20:00, 22:00)
    assert_eq!(four.dinner, vec!["22:00"]);

    let two = engine.available_slots("2030-06-01", 2).await.unwrap();
    assert_eq!(two.len(), 13);
    assert!(two.contains("20:00"));
}

// ── Ledger transitions ───────────────────────────────────

#[tokio::test]
async fn confirm_reject_cancel() {
    let engine = seeded_engine("transitions.wal").await;
    let a = book(&engine, day(1), 720, 2).await.unwrap();
    let b = book(&engine, day(1), 720, 2).await.unwrap();
    let c = book(&engine, day(1), 720, 2).await.unwrap();

    assert_eq!(engine.confirm(a.id).await.unwrap().status, ReservationStatus::Confirmed);
    assert_eq!(engine.reject(b.id).await.unwrap().status, ReservationStatus::Rejected);
    assert_eq!(engine.cancel(c.id).await.unwrap().status, ReservationStatus::Canceled);

    assert_eq!(
        engine.confirm(a.id).await,
        Err(EngineError::AlreadyFinalized {
            id: a.id,
            status: ReservationStatus::Confirmed,
        })
    );
    assert_eq!(
        engine.cancel(a.id).await,
        Err(EngineError::AlreadyFinalized {
            id: a.id,
            status: ReservationStatus::Confirmed,
        })
    );
    assert_eq!(
        engine.confirm(b.id).await,
        Err(EngineError::AlreadyFinalized {
            id: b.id,
            status: ReservationStatus::Rejected,
        })
    );
    assert_eq!(engine.reject(404).await, Err(EngineError::NotFound(404)));
}

#[tokio::test]
async fn inactive_reservations_free_the_table() {
    let engine = seeded_engine("free_table.wal").await;
    let first = book(&engine, day(1), 1200, 6).await.unwrap();
    assert_eq!(book(&engine, day(1), 1200, 6).await, Err(EngineError::NoAvailableTable));

    engine.cancel(first.id).await.unwrap();
    let second = book(&engine, day(1), 1200, 6).await.unwrap();
    assert_eq!(second.table_id, 9);

    engine.reject(second.id).await.unwrap();
    assert!(book(&engine, day(1), 1230, 6).await.is_ok());
}

// ── Listings and stats ───────────────────────────────────

#[tokio::test]
async fn listings_are_newest_first() {
    let engine = seeded_engine("ordering.wal").await;
    let early = book(&engine, day(1), 720, 2).await.unwrap();
    let late = book(&engine, day(2), 720, 2).await.unwrap();
    let evening = book(&engine, day(1), 1200, 2).await.unwrap();
    let twin = book(&engine, day(1), 1200, 2).await.unwrap();
    engine
        .book("Alan Turing".into(), "alan@example.com".into(), day(3), 720, 2)
        .await
        .unwrap();

    let ada: Vec<ReservationId> = engine
        .list_by_email("ada@example.com")
        .await
        .iter()
        .map(|r| r.id)
        .collect();
    // same date and time: higher id first
    assert_eq!(ada, vec![late.id, twin.id, evening.id, early.id]);

    let all = engine.list_all().await;
    assert_eq!(all.len(), 5);
    assert_eq!(all[0].email, "alan@example.com");
    assert!(engine.list_by_email("nobody@example.com").await.is_empty());
}

#[tokio::test]
async fn stats_count_today_pending_and_tables() {
    let engine = seeded_engine("stats.wal").await;
    let a = book(&engine, day(1), 720, 2).await.unwrap();
    let b = book(&engine, day(1), 1200, 2).await.unwrap();
    book(&engine, day(2), 720, 2).await.unwrap();
    engine.confirm(a.id).await.unwrap();
    engine.cancel(b.id).await.unwrap();
    engine.set_table_status(3, TableStatus::Unavailable).await.unwrap();

    assert_eq!(
        engine.stats_on(day(1)).await,
        AdminStats {
            today_count: 2,
            pending_count: 1,
            available_table_count: 8,
        }
    );
    assert_eq!(engine.stats_on(day(9)).await.today_count, 0);
}

// ── Concurrency ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_for_last_table() {
    let engine = Arc::new(Engine::new(test_wal_path("race_pair.wal")).unwrap());
    engine.seed_tables(&[(4, 1)]).await.unwrap();

    let a = tokio::spawn({
        let engine = engine.clone();
        async move { book(&engine, day(1), 1200, 4).await }
    });
    let b = tokio::spawn({
        let engine = engine.clone();
        async move { book(&engine, day(1), 1230, 4).await }
    });
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| **r == Err(EngineError::NoAvailableTable))
            .count(),
        1
    );
    assert_eq!(engine.list_all().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_racers_one_winner() {
    let engine = Arc::new(Engine::new(test_wal_path("race_many.wal")).unwrap());
    engine.seed_tables(&[(2, 1), (6, 1)]).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..32 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { book(&engine, day(1), 1200, 5).await }));
    }
    let mut wins = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(r) => {
                assert_eq!(r.table_id, 2);
                wins += 1;
            }
            Err(e) => assert_eq!(e, EngineError::NoAvailableTable),
        }
    }
    assert_eq!(wins, 1);
    assert_schedule_sound(&engine).await;
}

// ── Persistence ──────────────────────────────────────────

#[tokio::test]
async fn state_survives_restart() {
    let path = test_wal_path("restart.wal");
    let before = {
        let engine = Engine::new(path.clone()).unwrap();
        engine.seed_tables(&SEED_LAYOUT).await.unwrap();
        let a = book(&engine, day(1), 720, 2).await.unwrap();
        let b = book(&engine, day(1), 1200, 4).await.unwrap();
        engine.confirm(a.id).await.unwrap();
        engine.reject(b.id).await.unwrap();
        engine.set_table_seats(9, 8).await.unwrap();
        engine.list_all().await
    };

    let engine = Engine::new(path).unwrap();
    assert_eq!(engine.list_all().await, before);
    assert_eq!(engine.tables().len(), 9);
    assert_eq!(engine.tables()[8].seats, 8);
    // seeding an existing roster is a no-op
    assert!(engine.seed_tables(&SEED_LAYOUT).await.unwrap().is_empty());

    let next = book(&engine, day(1), 720, 2).await.unwrap();
    assert!(before.iter().all(|r| r.id < next.id));
    assert_eq!(next.table_id, 2);
}

#[tokio::test]
async fn compaction_keeps_state() {
    let path = test_wal_path("compact_engine.wal");
    let engine = seeded_engine("compact_engine.wal").await;
    for time in slots::LUNCH_SLOTS {
        let r = book(&engine, day(1), time, 2).await.unwrap();
        engine.cancel(r.id).await.unwrap();
    }
    let kept = book(&engine, day(2), 1200, 2).await.unwrap();
    engine.confirm(kept.id).await.unwrap();
    let before = engine.list_all().await;
    let size_before = std::fs::metadata(&path).unwrap().len();
    assert_eq!(engine.wal_appends_since_compact().await, 9 + 12 + 2);

    engine.compact_wal().await.unwrap();
    assert_eq!(engine.wal_appends_since_compact().await, 0);
    assert!(std::fs::metadata(&path).unwrap().len() <= size_before);

    // writes after compaction land in the new log
    let after = book(&engine, day(3), 720, 2).await.unwrap();
    drop(engine);

    let reopened = Engine::new(path).unwrap();
    let all = reopened.list_all().await;
    assert_eq!(all.len(), before.len() + 1);
    assert!(all.iter().any(|r| r.id == after.id));
    assert_eq!(
        reopened.get_reservation(kept.id).await.unwrap().status,
        ReservationStatus::Confirmed
    );
}

#[tokio::test]
async fn group_commit_batches_appends() {
    let path = test_wal_path("group_commit_batch.wal");
    let engine = Arc::new(Engine::new(path.clone()).unwrap());
    engine.seed_tables(&SEED_LAYOUT).await.unwrap();

    let n = 20;
    let mut handles = Vec::new();
    for i in 0..n {
        let eng = engine.clone();
        handles.push(tokio::spawn(async move {
            book(&eng, day(1 + i % 20), 720, 2).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(engine.list_all().await.len(), n as usize);

    let engine2 = Engine::new(path).unwrap();
    assert_eq!(engine2.list_all().await.len(), n as usize);
}

// ── Randomised safety invariant ──────────────────────────

/// Book, confirm, reject and cancel at random; the schedule must stay sound throughout.
async fn random_walk(engine: &Engine, rng: &mut StdRng, steps: usize) {
    let times: Vec<Minute> = (0..44).map(|i| 720 + i * 15).collect();
    for _ in 0..steps {
        if rng.gen_bool(0.7) {
            let date = day(rng.gen_range(1..=3));
            let time = *times.choose(rng).unwrap();
            let guests = rng.gen_range(1..=6);
            match book(engine, date, time, guests).await {
                Ok(_) | Err(EngineError::NoAvailableTable) => {}
                Err(e) => panic!("unexpected booking error: {e}"),
            }
        } else {
            let all = engine.list_all().await;
            let Some(r) = all.choose(rng) else { continue };
            let result = match rng.gen_range(0..3) {
                0 => engine.confirm(r.id).await,
                1 => engine.reject(r.id).await,
                _ => engine.cancel(r.id).await,
            };
            match result {
                Ok(_) | Err(EngineError::AlreadyFinalized { .. }) => {}
                Err(e) => panic!("unexpected transition error: {e}"),
            }
        }
    }
}

#[tokio::test]
async fn random_sequence_never_double_books() {
    let engine = seeded_engine("random_seq.wal").await;
    let mut rng = StdRng::seed_from_u64(0x7AB1E);
    for _ in 0..10 {
        random_walk(&engine, &mut rng, 40).await;
        assert_schedule_sound(&engine).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn random_concurrent_walks_never_double_book() {
    let engine = Arc::new(seeded_engine("random_concurrent.wal").await);
    let mut handles = Vec::new();
    for worker in 0..8u64 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(1_000 + worker);
            random_walk(&engine, &mut rng, 60).await;
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert_schedule_sound(&engine).await;
}
