use chrono::{Duration, NaiveDate, NaiveTime};
use std::collections::HashSet;

use crate::model::*;

use super::EngineError;

// ── Slot resolution ──────────────────────────────────────────────

/// Enumerate grid points `start, start+g, start+2g, …` while `< end`
/// (half-open). A non-empty window always admits its own start point, even
/// when narrower than the granularity; an inverted window is an error.
/// Enumeration stops rather than wrap past midnight.
pub fn generate_slots(
    start: NaiveTime,
    end: NaiveTime,
    granularity: Duration,
) -> Result<Vec<NaiveTime>, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidInterval { start, end });
    }
    let mut slots = Vec::new();
    let mut t = start;
    while t < end {
        slots.push(t);
        let (next, wrap) = t.overflowing_add_signed(granularity);
        if wrap != 0 {
            break;
        }
        t = next;
    }
    Ok(slots)
}

/// Resolve a doctor's bookable slot start-times for a date:
/// weekday → active template → grid enumeration → minus slots already held
/// by non-cancelled appointments. Ascending order. Advisory only — results
/// may be stale by the time a booking lands; admission re-checks under lock.
pub fn free_slots(rs: &ResourceState, date: NaiveDate) -> SlotListing {
    let weekday = Weekday::from_date(date);
    let Some(template) = rs.active_template(weekday) else {
        return SlotListing {
            slots: Vec::new(),
            available: false,
        };
    };

    // Template spans are validated at write time, so enumeration can't fail;
    // a corrupt span just means no bookable slots.
    let candidates =
        generate_slots(template.span.start, template.span.end, slot_granularity())
            .unwrap_or_default();

    let booked: HashSet<NaiveTime> = rs
        .day(date)
        .iter()
        .filter(|a| a.is_active_appointment())
        .map(|a| a.span.start)
        .collect();

    SlotListing {
        slots: candidates
            .into_iter()
            .filter(|t| !booked.contains(t))
            .collect(),
        available: true,
    }
}
