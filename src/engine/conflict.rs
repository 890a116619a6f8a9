use crate::clock::format_time;
use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_guests(guests: u32) -> Result<(), EngineError> {
    if guests == 0 {
        return Err(EngineError::InvalidGuests(guests));
    }
    Ok(())
}

/// A start time must be a minute of the day, `[0, 1440)`.
pub(crate) fn validate_time(time: Minute) -> Result<(), EngineError> {
    if time >= MINUTES_PER_DAY {
        return Err(EngineError::InvalidTimeFormat(format_time(time)));
    }
    Ok(())
}

pub(crate) fn validate_contact(name: &str, email: &str) -> Result<(), EngineError> {
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(EngineError::LimitExceeded("email too long"));
    }
    Ok(())
}

/// First active reservation on `table_id` whose window intersects `window`.
///
/// Canceled and rejected reservations never conflict. Windows are compared
/// half-open, so a booking ending exactly when `window` starts is free.
pub fn find_conflict(day: &DaySchedule, table_id: TableId, window: &Window) -> Option<ReservationId> {
    day.active_on(table_id)
        .find(|r| r.window().overlaps(window))
        .map(|r| r.id)
}

pub fn has_conflict(day: &DaySchedule, table_id: TableId, window: &Window) -> bool {
    find_conflict(day, table_id, window).is_some()
}
