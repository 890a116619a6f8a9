use crate::model::Minute;

/// 12:00 – 14:30, every half hour.
pub const LUNCH_SLOTS: [Minute; 6] = [720, 750, 780, 810, 840, 870];

/// 19:00 – 22:00, every half hour.
pub const DINNER_SLOTS: [Minute; 7] = [1140, 1170, 1200, 1230, 1260, 1290, 1320];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Lunch,
    Dinner,
    Unclassified,
}

/// Canonical start times in catalog order: lunch first, then dinner.
pub fn catalog() -> impl Iterator<Item = Minute> {
    LUNCH_SLOTS.into_iter().chain(DINNER_SLOTS)
}

/// Presentation grouping only; says nothing about whether a time is bookable.
pub fn classify(time: Minute) -> Service {
    match time / 60 {
        12..=14 => Service::Lunch,
        h if h >= 19 => Service::Dinner,
        _ => Service::Unclassified,
    }
}

/// Times a reservation may be committed at: 12:00–14:59 or 19:00–22:59.
pub fn within_service_hours(time: Minute) -> bool {
    matches!(time / 60, 12..=14 | 19..=22)
}
