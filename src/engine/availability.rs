use crate::clock::{booking_window, format_time};
use crate::model::*;
use crate::slots::{self, Service};

use super::matcher::best_fit;

// ── Availability scan ────────────────────────────────────────────

/// Catalog slots, in catalog order, for which a best-fit table exists.
///
/// Cost is `slots × tables × reservations on the day`, which is fine at
/// restaurant scale.
pub fn scan(tables: &[Table], day: &DaySchedule, guests: u32) -> Vec<Minute> {
    slots::catalog()
        .filter(|&slot| best_fit(tables, day, guests, &booking_window(slot)).is_some())
        .collect()
}

/// Keep only slots starting strictly after `now`.
pub fn drop_started(found: &[Minute], now: Minute) -> Vec<Minute> {
    found.iter().copied().filter(|&slot| slot > now).collect()
}

/// Split slots into lunch and dinner lists; unclassified times are dropped.
pub fn group(found: &[Minute]) -> AvailableSlots {
    let mut out = AvailableSlots::default();
    for &slot in found {
        match slots::classify(slot) {
            Service::Lunch => out.lunch.push(format_time(slot)),
            Service::Dinner => out.dinner.push(format_time(slot)),
            Service::Unclassified => {}
        }
    }
    out
}
