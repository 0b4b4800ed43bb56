use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::model::Span;

/// Engine error taxonomy. Conflicts (`SlotTaken`, `ShiftOverlap`) are
/// business outcomes — the caller should re-query and pick another time.
/// `WalError` is the transient store-failure case, safe to retry later;
/// everything else is caller-fixable or a missing target.
#[derive(Debug)]
pub enum EngineError {
    /// A required field was absent from the request.
    MissingField(&'static str),
    /// A field was present but malformed.
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    /// An interval with `start >= end`.
    InvalidInterval { start: NaiveTime, end: NaiveTime },
    /// A shift must name exactly one of staff or doctor.
    AmbiguousIdentity,
    /// The exact (doctor, date, time) slot already holds a live appointment.
    SlotTaken {
        doctor_id: Ulid,
        date: NaiveDate,
        time: NaiveTime,
    },
    /// The proposed shift overlaps an existing one; names the blocker so
    /// callers can explain the rejection.
    ShiftOverlap { other_id: Ulid, other: Span },
    NotFound(Ulid),
    LimitExceeded(&'static str),
    /// The durable log rejected the write. Transient; nothing was applied.
    WalError(String),
}

impl EngineError {
    /// True for genuine contention: re-query free slots and retry with a
    /// different time. False for everything else, including `WalError`.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::SlotTaken { .. } | EngineError::ShiftOverlap { .. }
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::MissingField(field) => write!(f, "{field} is required"),
            EngineError::InvalidField { field, reason } => {
                write!(f, "invalid {field}: {reason}")
            }
            EngineError::InvalidInterval { start, end } => write!(
                f,
                "invalid interval: start {} must be before end {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            ),
            EngineError::AmbiguousIdentity => {
                write!(f, "exactly one of staff_id or doctor_id must be set")
            }
            EngineError::SlotTaken {
                doctor_id,
                date,
                time,
            } => write!(
                f,
                "slot {} on {date} for doctor {doctor_id} is already booked",
                time.format("%H:%M")
            ),
            EngineError::ShiftOverlap { other_id, other } => {
                write!(f, "shift overlaps existing shift {other_id} at {other}")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
