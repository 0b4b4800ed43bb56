use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::observability::SLOT_QUERIES_TOTAL;

use super::availability::free_slots;
use super::{Engine, EngineError};

fn appointment_info(doctor_id: Ulid, date: NaiveDate, alloc: &Allocation) -> Option<AppointmentInfo> {
    match &alloc.kind {
        AllocationKind::Appointment {
            patient_id,
            department,
            status,
            notes,
        } => Some(AppointmentInfo {
            id: alloc.id,
            doctor_id,
            patient_id: *patient_id,
            department: department.clone(),
            date,
            time: alloc.span.start,
            status: *status,
            notes: notes.clone(),
        }),
        AllocationKind::Shift { .. } => None,
    }
}

impl Engine {
    /// Free slots for a doctor on a date. Advisory: the answer may be stale
    /// by the time a booking lands; admission is the authoritative check.
    /// An unknown doctor or a day without an active template is a valid
    /// "not available" answer, never an error.
    pub async fn list_free_slots(&self, doctor_id: Ulid, date: NaiveDate) -> SlotListing {
        metrics::counter!(SLOT_QUERIES_TOTAL).increment(1);
        let key = ResourceIdentity::Doctor(doctor_id);
        let Some(rs) = self.get_resource(&key) else {
            return SlotListing {
                slots: Vec::new(),
                available: false,
            };
        };
        let guard = rs.read().await;
        free_slots(&guard, date)
    }

    pub async fn get_appointment(&self, id: Ulid) -> Result<AppointmentInfo, EngineError> {
        let key = self
            .resource_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let rs = self.get_resource(&key).ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        guard
            .find_allocation(id)
            .and_then(|(date, alloc)| appointment_info(key.id(), date, alloc))
            .ok_or(EngineError::NotFound(id))
    }

    /// All appointments, optionally filtered by doctor and/or date,
    /// ordered by (date, time).
    pub async fn list_appointments(
        &self,
        doctor_id: Option<Ulid>,
        date: Option<NaiveDate>,
    ) -> Vec<AppointmentInfo> {
        let mut out = Vec::new();
        for (key, rs) in self.snapshot_resources() {
            let ResourceIdentity::Doctor(doc) = key else {
                continue;
            };
            if doctor_id.is_some_and(|want| want != doc) {
                continue;
            }
            let guard = rs.read().await;
            for (day_date, day) in &guard.days {
                if date.is_some_and(|want| want != *day_date) {
                    continue;
                }
                out.extend(day.iter().filter_map(|a| appointment_info(doc, *day_date, a)));
            }
        }
        out.sort_by_key(|a| (a.date, a.time));
        out
    }

    /// Shifts filtered by identity and/or date, ordered by (date, start) —
    /// the duty-roster listing.
    pub async fn list_shifts(
        &self,
        identity: Option<ResourceIdentity>,
        date: Option<NaiveDate>,
    ) -> Vec<ShiftInfo> {
        let mut out = Vec::new();
        for (key, rs) in self.snapshot_resources() {
            if identity.is_some_and(|want| want != key) {
                continue;
            }
            let guard = rs.read().await;
            for (day_date, day) in &guard.days {
                if date.is_some_and(|want| want != *day_date) {
                    continue;
                }
                for alloc in day {
                    if let AllocationKind::Shift { remarks } = &alloc.kind {
                        out.push(ShiftInfo {
                            id: alloc.id,
                            identity: key,
                            date: *day_date,
                            span: alloc.span,
                            remarks: remarks.clone(),
                        });
                    }
                }
            }
        }
        out.sort_by_key(|s| (s.date, s.span.start));
        out
    }

    /// Appointments on or after `from`, ordered by (date, time), joined
    /// with patient/doctor display names through the directory collaborator.
    pub async fn list_upcoming(&self, from: NaiveDate) -> Vec<UpcomingAppointment> {
        let mut plain = Vec::new();
        for (key, rs) in self.snapshot_resources() {
            let ResourceIdentity::Doctor(doc) = key else {
                continue;
            };
            let guard = rs.read().await;
            for (day_date, day) in guard.days.range(from..) {
                plain.extend(day.iter().filter_map(|a| appointment_info(doc, *day_date, a)));
            }
        }
        plain.sort_by_key(|a| (a.date, a.time));

        let mut out = Vec::with_capacity(plain.len());
        for a in plain {
            out.push(UpcomingAppointment {
                id: a.id,
                doctor_id: a.doctor_id,
                doctor_name: self.directory.display_name(a.doctor_id).await,
                patient_id: a.patient_id,
                patient_name: self.directory.display_name(a.patient_id).await,
                department: a.department,
                date: a.date,
                time: a.time,
                status: a.status,
            });
        }
        out
    }
}
