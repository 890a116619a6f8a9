use crate::model::{ReservationId, ReservationStatus, TableId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidTimeFormat(String),
    InvalidDateFormat(String),
    InvalidGuests(u32),
    NoAvailableTable,
    TableNotFound(TableId),
    NotFound(ReservationId),
    AlreadyFinalized {
        id: ReservationId,
        status: ReservationStatus,
    },
    LimitExceeded(&'static str),
    Storage(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidTimeFormat(s) => write!(f, "invalid time format: {s:?} (expected HH:MM)"),
            EngineError::InvalidDateFormat(s) => {
                write!(f, "invalid date format: {s:?} (expected YYYY-MM-DD)")
            }
            EngineError::InvalidGuests(n) => write!(f, "invalid number of guests: {n}"),
            EngineError::NoAvailableTable => write!(f, "no available table"),
            EngineError::TableNotFound(id) => write!(f, "table not found: {id}"),
            EngineError::NotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::AlreadyFinalized { id, status } => {
                write!(f, "reservation {id} is already {status}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
