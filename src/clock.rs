use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::engine::EngineError;
use crate::model::{Minute, Ms, Window, MINUTES_PER_DAY};

/// Every booking occupies its table for two hours.
pub const BOOKING_DURATION: Minute = 120;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Wall-clock time in the restaurant's (local) zone.
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Parse a 24-hour `HH:MM` string into a minute of day in `[0, 1440)`.
pub fn parse_time(s: &str) -> Result<Minute, EngineError> {
    let t = NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| EngineError::InvalidTimeFormat(s.to_string()))?;
    Ok(minute_of(&t))
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| EngineError::InvalidDateFormat(s.to_string()))
}

pub fn minute_of(t: &NaiveTime) -> Minute {
    (t.hour() * 60 + t.minute()) as Minute
}

pub fn format_time(m: Minute) -> String {
    format!("{:02}:{:02}", m / 60, m % 60)
}

/// The interval a booking starting at `start` occupies on its own date.
///
/// A window reaching midnight ends at `1440` instead of wrapping, so `end > start`
/// always holds; time past midnight belongs to the next date and is not tracked here.
pub fn booking_window(start: Minute) -> Window {
    let end = (start + BOOKING_DURATION).min(MINUTES_PER_DAY);
    Window::new(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_time_valid() {
        assert_eq!(parse_time("00:00").unwrap(), 0);
        assert_eq!(parse_time("12:30").unwrap(), 750);
        assert_eq!(parse_time("23:59").unwrap(), 1439);
    }

    #[test]
    fn parse_time_rejects_garbage() {
        for bad in ["", "noon", "24:00", "12:60", "12-30", "1230"] {
            assert!(
                matches!(parse_time(bad), Err(EngineError::InvalidTimeFormat(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn parse_date_valid_and_invalid() {
        assert_eq!(
            parse_date("2026-02-28").unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, 28).unwrap()
        );
        assert!(matches!(
            parse_date("2026-02-30"),
            Err(EngineError::InvalidDateFormat(_))
        ));
        assert!(matches!(
            parse_date("28/02/2026"),
            Err(EngineError::InvalidDateFormat(_))
        ));
    }

    #[test]
    fn window_is_two_hours() {
        assert_eq!(booking_window(720), Window::new(720, 840));
        assert_eq!(booking_window(1140), Window::new(1140, 1260));
    }

    #[test]
    fn window_ending_at_midnight_is_1440() {
        let w = booking_window(22 * 60);
        assert_eq!(w, Window::new(1320, 1440));
        assert!(w.end > w.start);
    }

    #[test]
    fn window_past_midnight_is_clipped() {
        let w = booking_window(22 * 60 + 30);
        assert_eq!(w, Window::new(1350, 1440));
    }

    #[test]
    fn format_round_trips_catalog_times() {
        assert_eq!(format_time(720), "12:00");
        assert_eq!(format_time(1290), "21:30");
        assert_eq!(format_time(5), "00:05");
    }
}
