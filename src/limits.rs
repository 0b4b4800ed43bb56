//! Hard input limits. Everything above these is rejected with
//! `EngineError::LimitExceeded` before any state is touched.

/// Max length of free-text notes on an appointment.
pub const MAX_NOTES_LEN: usize = 2000;

/// Max length of free-text remarks on a duty shift.
pub const MAX_REMARKS_LEN: usize = 2000;

/// Max length of a department name on an appointment.
pub const MAX_DEPARTMENT_LEN: usize = 120;

/// Max availability templates kept per resource (7 weekdays, with headroom
/// for superseded rows that admins have not cleaned up).
pub const MAX_TEMPLATES_PER_RESOURCE: usize = 64;

/// Max allocations (appointments + shifts) per resource per day.
/// A day has 96 15-minute slots; 512 leaves room for cancelled history.
pub const MAX_ALLOCATIONS_PER_DAY: usize = 512;
