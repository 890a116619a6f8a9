use crate::model::*;

use super::conflict::has_conflict;

/// Best-fit table search.
///
/// Among available tables seating at least `guests` with no active booking
/// intersecting `window`, pick the one with the fewest seats; ties go to the
/// lowest id. No business-hours check happens here, so any time of day works.
pub fn best_fit(tables: &[Table], day: &DaySchedule, guests: u32, window: &Window) -> Option<TableId> {
    tables
        .iter()
        .filter(|t| t.is_available() && t.seats >= guests)
        .filter(|t| !has_conflict(day, t.id, window))
        .min_by_key(|t| (t.seats, t.id))
        .map(|t| t.id)
}
