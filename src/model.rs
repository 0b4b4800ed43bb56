use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Appointment slots are generated on a fixed 15-minute grid, process-wide.
pub const SLOT_GRANULARITY_MIN: i64 = 15;

pub fn slot_granularity() -> Duration {
    Duration::minutes(SLOT_GRANULARITY_MIN)
}

/// Half-open time-of-day interval `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Span {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Half-open overlap: adjacent spans (`a.end == b.start`) do NOT overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// The span a booked slot occupies: `[time, time + granularity)`, clamped
/// just before midnight when the grid point is the last of the day. The
/// clamp is display-only — slot admission compares start times exactly.
pub fn slot_span(time: NaiveTime) -> Span {
    let (end, wrap) = time.overflowing_add_signed(slot_granularity());
    let end = if wrap != 0 {
        NaiveTime::from_hms_opt(23, 59, 59).expect("valid clock time")
    } else {
        end
    };
    Span::new(time, end)
}

/// Day of week, owned by this crate so availability templates and WAL
/// records serialize stably. Derivation from a date is pure and
/// locale-independent (proleptic Gregorian).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    pub fn from_date(date: NaiveDate) -> Self {
        match date.weekday() {
            chrono::Weekday::Mon => Weekday::Mon,
            chrono::Weekday::Tue => Weekday::Tue,
            chrono::Weekday::Wed => Weekday::Wed,
            chrono::Weekday::Thu => Weekday::Thu,
            chrono::Weekday::Fri => Weekday::Fri,
            chrono::Weekday::Sat => Weekday::Sat,
            chrono::Weekday::Sun => Weekday::Sun,
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
        };
        f.write_str(name)
    }
}

/// Whose time is being allocated. Shifts belong to exactly one of staff or
/// doctor; the variant makes that structural instead of two nullable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceIdentity {
    Doctor(Ulid),
    Staff(Ulid),
}

impl ResourceIdentity {
    pub fn id(&self) -> Ulid {
        match self {
            ResourceIdentity::Doctor(id) | ResourceIdentity::Staff(id) => *id,
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceIdentity::Doctor(id) => write!(f, "doctor {id}"),
            ResourceIdentity::Staff(id) => write!(f, "staff {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl FromStr for AppointmentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            _ => Err(()),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppointmentStatus::Scheduled => "Scheduled",
            AppointmentStatus::Completed => "Completed",
            AppointmentStatus::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

/// One recurring weekly availability window for a doctor. Written by an
/// external admin surface, read-only during slot resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRule {
    pub id: Ulid,
    pub weekday: Weekday,
    pub span: Span,
    pub active: bool,
}

/// What an allocation represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationKind {
    /// A patient appointment occupying one grid slot.
    Appointment {
        patient_id: Ulid,
        department: Option<String>,
        status: AppointmentStatus,
        notes: Option<String>,
    },
    /// A duty shift covering an arbitrary interval.
    Shift { remarks: Option<String> },
}

/// A single allocation of a resource's time on some day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: Ulid,
    pub span: Span,
    pub kind: AllocationKind,
}

impl Allocation {
    pub fn is_appointment(&self) -> bool {
        matches!(self.kind, AllocationKind::Appointment { .. })
    }

    pub fn is_shift(&self) -> bool {
        matches!(self.kind, AllocationKind::Shift { .. })
    }

    /// An appointment counts toward slot occupancy unless it was cancelled.
    /// Shifts are never "active" in the slot sense.
    pub fn is_active_appointment(&self) -> bool {
        matches!(
            self.kind,
            AllocationKind::Appointment {
                status: AppointmentStatus::Scheduled | AppointmentStatus::Completed,
                ..
            }
        )
    }
}

/// All scheduling state for one resource: its weekly templates plus the
/// allocations of every day, each day kept sorted by start time.
#[derive(Debug, Clone)]
pub struct ResourceState {
    pub key: ResourceIdentity,
    pub templates: Vec<TemplateRule>,
    pub days: BTreeMap<NaiveDate, Vec<Allocation>>,
}

impl ResourceState {
    pub fn new(key: ResourceIdentity) -> Self {
        Self {
            key,
            templates: Vec::new(),
            days: BTreeMap::new(),
        }
    }

    /// Insert or replace a template by id.
    pub fn upsert_template(&mut self, rule: TemplateRule) {
        if let Some(existing) = self.templates.iter_mut().find(|t| t.id == rule.id) {
            *existing = rule;
        } else {
            self.templates.push(rule);
        }
    }

    pub fn remove_template(&mut self, id: Ulid) -> Option<TemplateRule> {
        let pos = self.templates.iter().position(|t| t.id == id)?;
        Some(self.templates.remove(pos))
    }

    /// The template consulted for a weekday. When several active rows exist
    /// the highest id wins — ULIDs are creation-ordered, so this is
    /// "most recently created wins" and is stable across replays.
    pub fn active_template(&self, weekday: Weekday) -> Option<&TemplateRule> {
        self.templates
            .iter()
            .filter(|t| t.active && t.weekday == weekday)
            .max_by_key(|t| t.id)
    }

    /// Insert an allocation keeping the day sorted by span start.
    pub fn insert_allocation(&mut self, date: NaiveDate, alloc: Allocation) {
        let day = self.days.entry(date).or_default();
        let pos = day
            .binary_search_by_key(&alloc.span.start, |a| a.span.start)
            .unwrap_or_else(|e| e);
        day.insert(pos, alloc);
    }

    /// Remove an allocation by id, pruning the day entry when it empties.
    pub fn remove_allocation(&mut self, id: Ulid) -> Option<(NaiveDate, Allocation)> {
        let mut hit = None;
        for (date, day) in self.days.iter_mut() {
            if let Some(pos) = day.iter().position(|a| a.id == id) {
                hit = Some((*date, day.remove(pos)));
                break;
            }
        }
        if let Some((date, _)) = &hit
            && self.days.get(date).is_some_and(|d| d.is_empty()) {
                self.days.remove(date);
            }
        hit
    }

    pub fn find_allocation(&self, id: Ulid) -> Option<(NaiveDate, &Allocation)> {
        for (date, day) in &self.days {
            if let Some(a) = day.iter().find(|a| a.id == id) {
                return Some((*date, a));
            }
        }
        None
    }

    pub fn find_allocation_mut(&mut self, id: Ulid) -> Option<(NaiveDate, &mut Allocation)> {
        for (date, day) in self.days.iter_mut() {
            if let Some(a) = day.iter_mut().find(|a| a.id == id) {
                return Some((*date, a));
            }
        }
        None
    }

    /// All allocations on a date, sorted by start time.
    pub fn day(&self, date: NaiveDate) -> &[Allocation] {
        self.days.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
/// Every event names its resource so replay can route it without lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TemplateSet {
        id: Ulid,
        doctor_id: Ulid,
        weekday: Weekday,
        span: Span,
        active: bool,
    },
    TemplateRemoved {
        id: Ulid,
        doctor_id: Ulid,
    },
    AppointmentBooked {
        id: Ulid,
        doctor_id: Ulid,
        patient_id: Ulid,
        department: Option<String>,
        date: NaiveDate,
        time: NaiveTime,
        status: AppointmentStatus,
        notes: Option<String>,
    },
    AppointmentStatusChanged {
        id: Ulid,
        doctor_id: Ulid,
        status: AppointmentStatus,
    },
    AppointmentDeleted {
        id: Ulid,
        doctor_id: Ulid,
    },
    ShiftAssigned {
        id: Ulid,
        identity: ResourceIdentity,
        date: NaiveDate,
        span: Span,
        remarks: Option<String>,
    },
    ShiftUpdated {
        id: Ulid,
        identity: ResourceIdentity,
        date: NaiveDate,
        span: Span,
        remarks: Option<String>,
    },
    ShiftDeleted {
        id: Ulid,
        identity: ResourceIdentity,
    },
}

impl Event {
    /// The resource an event belongs to.
    pub fn identity(&self) -> ResourceIdentity {
        match self {
            Event::TemplateSet { doctor_id, .. }
            | Event::TemplateRemoved { doctor_id, .. }
            | Event::AppointmentBooked { doctor_id, .. }
            | Event::AppointmentStatusChanged { doctor_id, .. }
            | Event::AppointmentDeleted { doctor_id, .. } => ResourceIdentity::Doctor(*doctor_id),
            Event::ShiftAssigned { identity, .. }
            | Event::ShiftUpdated { identity, .. }
            | Event::ShiftDeleted { identity, .. } => *identity,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// Free-slot resolution result. `available` is false when the doctor has no
/// active template that weekday — a valid outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotListing {
    pub slots: Vec<NaiveTime>,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentInfo {
    pub id: Ulid,
    pub doctor_id: Ulid,
    pub patient_id: Ulid,
    pub department: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftInfo {
    pub id: Ulid,
    pub identity: ResourceIdentity,
    pub date: NaiveDate,
    pub span: Span,
    pub remarks: Option<String>,
}

/// `AppointmentInfo` joined with display names for the upcoming view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcomingAppointment {
    pub id: Ulid,
    pub doctor_id: Ulid,
    pub doctor_name: Option<String>,
    pub patient_id: Ulid,
    pub patient_name: Option<String>,
    pub department: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AppointmentStatus,
}
