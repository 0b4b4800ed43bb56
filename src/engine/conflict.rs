use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Validate an arbitrary interval before a `Span` is built from it.
pub(crate) fn validate_interval(start: NaiveTime, end: NaiveTime) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidInterval { start, end });
    }
    Ok(Span::new(start, end))
}

pub(crate) fn validate_text(
    field: &'static str,
    value: Option<&str>,
    max_len: usize,
) -> Result<(), EngineError> {
    match value {
        Some(v) if v.len() > max_len => Err(EngineError::LimitExceeded(field)),
        _ => Ok(()),
    }
}

pub(crate) fn check_day_capacity(rs: &ResourceState, date: NaiveDate) -> Result<(), EngineError> {
    if rs.day(date).len() >= MAX_ALLOCATIONS_PER_DAY {
        return Err(EngineError::LimitExceeded("too many allocations on this day"));
    }
    Ok(())
}

/// Authoritative slot check: the exact (doctor, date, time) triple must not
/// hold a non-cancelled appointment. Callers hold the resource's write lock,
/// so check-plus-insert is indivisible for concurrent bookings.
pub(crate) fn check_slot_free(
    rs: &ResourceState,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<(), EngineError> {
    for alloc in rs.day(date) {
        if alloc.is_active_appointment() && alloc.span.start == time {
            return Err(EngineError::SlotTaken {
                doctor_id: rs.key.id(),
                date,
                time,
            });
        }
    }
    Ok(())
}

/// Authoritative interval check for shifts: the proposed span must not
/// overlap any existing shift on the same resource and date. The rejection
/// names the blocking shift so callers can surface it. `exclude` skips the
/// shift itself on updates.
pub(crate) fn check_interval_free(
    rs: &ResourceState,
    date: NaiveDate,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    for alloc in rs.day(date) {
        if !alloc.is_shift() || exclude == Some(alloc.id) {
            continue;
        }
        if alloc.span.overlaps(span) {
            return Err(EngineError::ShiftOverlap {
                other_id: alloc.id,
                other: alloc.span,
            });
        }
    }
    Ok(())
}
