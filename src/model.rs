use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::clock;

/// Minute of day. `1440` only ever appears as the end of a [`Window`].
pub type Minute = u16;

/// Unix milliseconds, used for session timestamps.
pub type Ms = i64;

pub type TableId = u32;
pub type ReservationId = u64;

pub const MINUTES_PER_DAY: Minute = 1440;

/// Half-open interval `[start, end)` in minutes within one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: Minute,
    pub end: Minute,
}

impl Window {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "Window start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> Minute {
        self.end - self.start
    }

    /// Exact touch (`self.end == other.start`) is not an overlap.
    pub fn overlaps(&self, other: &Window) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    Available,
    Unavailable,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Available => "available",
            TableStatus::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub seats: u32,
    pub status: TableStatus,
}

impl Table {
    pub fn is_available(&self) -> bool {
        self.status == TableStatus::Available
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Rejected,
    Canceled,
}

impl ReservationStatus {
    /// Active reservations occupy their table.
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Rejected => "rejected",
            ReservationStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub name: String,
    pub email: String,
    pub table_id: TableId,
    pub date: NaiveDate,
    pub time: Minute,
    pub guests: u32,
    pub status: ReservationStatus,
}

impl Reservation {
    pub fn window(&self) -> Window {
        clock::booking_window(self.time)
    }
}

/// All reservations dated on one calendar day, sorted by `time`.
#[derive(Debug, Clone)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub reservations: Vec<Reservation>,
}

impl DaySchedule {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by time; equal times keep insertion order.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.time <= reservation.time);
        self.reservations.insert(pos, reservation);
    }

    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Active reservations held on `table_id`.
    pub fn active_on(&self, table_id: TableId) -> impl Iterator<Item = &Reservation> {
        self.reservations
            .iter()
            .filter(move |r| r.table_id == table_id && r.status.is_active())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
}

impl Account {
    /// The name written on reservations. Falls back to the username when no name is on file.
    pub fn full_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.trim(), self.last_name.trim()]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            self.username.clone()
        } else {
            parts.join(" ")
        }
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TableAdded {
        id: TableId,
        seats: u32,
        status: TableStatus,
    },
    TableUpdated {
        id: TableId,
        seats: u32,
        status: TableStatus,
    },
    ReservationCreated {
        id: ReservationId,
        table_id: TableId,
        date: NaiveDate,
        time: Minute,
        guests: u32,
        name: String,
        email: String,
    },
    ReservationStatusChanged {
        id: ReservationId,
        date: NaiveDate,
        status: ReservationStatus,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationInfo {
    pub id: ReservationId,
    pub name: String,
    pub email: String,
    pub table_id: TableId,
    pub date: NaiveDate,
    /// `HH:MM`
    pub time: String,
    pub guests: u32,
    pub status: ReservationStatus,
}

impl From<&Reservation> for ReservationInfo {
    fn from(r: &Reservation) -> Self {
        Self {
            id: r.id,
            name: r.name.clone(),
            email: r.email.clone(),
            table_id: r.table_id,
            date: r.date,
            time: clock::format_time(r.time),
            guests: r.guests,
            status: r.status,
        }
    }
}

/// Bookable start times, grouped for presentation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlots {
    pub lunch: Vec<String>,
    pub dinner: Vec<String>,
}

impl AvailableSlots {
    pub fn is_empty(&self) -> bool {
        self.lunch.is_empty() && self.dinner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lunch.len() + self.dinner.len()
    }

    pub fn contains(&self, time: &str) -> bool {
        self.lunch.iter().chain(self.dinner.iter()).any(|t| t == time)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStats {
    pub today_count: usize,
    pub pending_count: usize,
    pub available_table_count: usize,
}
