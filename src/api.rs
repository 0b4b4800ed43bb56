//! External request/response shapes. Transport (routing, auth,
//! serialization framing) belongs to the embedding layer; these types pin
//! down the payloads it exchanges with the engine: `"HH:MM"` times,
//! `"YYYY-MM-DD"` dates, required-field validation, and the mapping from
//! engine errors to HTTP-style status codes.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::{AppointmentStatus, ResourceIdentity, SlotListing};

fn parse_date(field: &'static str, value: Option<&str>) -> Result<NaiveDate, EngineError> {
    let raw = value.ok_or(EngineError::MissingField(field))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| EngineError::InvalidField {
        field,
        reason: "expected YYYY-MM-DD",
    })
}

fn parse_time(field: &'static str, value: Option<&str>) -> Result<NaiveTime, EngineError> {
    let raw = value.ok_or(EngineError::MissingField(field))?;
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| EngineError::InvalidField {
            field,
            reason: "expected HH:MM",
        })
}

/// HTTP-style status for an engine error: 400 caller-fixable, 404 missing
/// target, 409 contention (retry with a different time), 503 store failure
/// (retry later).
pub fn http_status(err: &EngineError) -> u16 {
    match err {
        EngineError::MissingField(_)
        | EngineError::InvalidField { .. }
        | EngineError::InvalidInterval { .. }
        | EngineError::AmbiguousIdentity
        | EngineError::LimitExceeded(_) => 400,
        EngineError::SlotTaken { .. } | EngineError::ShiftOverlap { .. } => 409,
        EngineError::NotFound(_) => 404,
        EngineError::WalError(_) => 503,
    }
}

// ── Free slots ───────────────────────────────────────────

#[derive(Debug, Default, Clone, Deserialize)]
pub struct SlotQuery {
    pub doctor_id: Option<Ulid>,
    pub date: Option<String>,
}

impl SlotQuery {
    pub fn validate(&self) -> Result<(Ulid, NaiveDate), EngineError> {
        let doctor_id = self.doctor_id.ok_or(EngineError::MissingField("doctor_id"))?;
        let date = parse_date("date", self.date.as_deref())?;
        Ok((doctor_id, date))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotsResponse {
    pub slots: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SlotsResponse {
    pub fn from_listing(listing: &SlotListing) -> Self {
        Self {
            slots: listing
                .slots
                .iter()
                .map(|t| t.format("%H:%M").to_string())
                .collect(),
            message: (!listing.available)
                .then(|| "Doctor not available on this day".to_string()),
        }
    }
}

// ── Booking ──────────────────────────────────────────────

#[derive(Debug, Default, Clone, Deserialize)]
pub struct BookingRequest {
    pub patient_id: Option<Ulid>,
    pub doctor_id: Option<Ulid>,
    pub department: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BookingParams {
    pub patient_id: Ulid,
    pub doctor_id: Ulid,
    pub department: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub notes: Option<String>,
}

impl BookingRequest {
    pub fn validate(&self) -> Result<BookingParams, EngineError> {
        Ok(BookingParams {
            patient_id: self
                .patient_id
                .ok_or(EngineError::MissingField("patient_id"))?,
            doctor_id: self
                .doctor_id
                .ok_or(EngineError::MissingField("doctor_id"))?,
            department: self.department.clone(),
            date: parse_date("date", self.date.as_deref())?,
            time: parse_time("time", self.time.as_deref())?,
            notes: self.notes.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub appointment_id: Ulid,
    pub message: String,
}

// ── Shifts ───────────────────────────────────────────────

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ShiftRequest {
    pub staff_id: Option<Ulid>,
    pub doctor_id: Option<Ulid>,
    pub shift_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ShiftParams {
    pub identity: ResourceIdentity,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub remarks: Option<String>,
}

impl ShiftRequest {
    pub fn validate(&self) -> Result<ShiftParams, EngineError> {
        let identity = match (self.staff_id, self.doctor_id) {
            (Some(id), None) => ResourceIdentity::Staff(id),
            (None, Some(id)) => ResourceIdentity::Doctor(id),
            _ => return Err(EngineError::AmbiguousIdentity),
        };
        Ok(ShiftParams {
            identity,
            date: parse_date("shift_date", self.shift_date.as_deref())?,
            start: parse_time("start_time", self.start_time.as_deref())?,
            end: parse_time("end_time", self.end_time.as_deref())?,
            remarks: self.remarks.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftConfirmation {
    pub shift_id: Ulid,
    pub message: String,
}

// ── Status updates ───────────────────────────────────────

#[derive(Debug, Default, Clone, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: Option<String>,
}

impl StatusUpdateRequest {
    pub fn validate(&self) -> Result<AppointmentStatus, EngineError> {
        let raw = self
            .status
            .as_deref()
            .ok_or(EngineError::MissingField("status"))?;
        raw.parse().map_err(|()| EngineError::InvalidField {
            field: "status",
            reason: "expected Scheduled, Completed or Cancelled",
        })
    }
}
