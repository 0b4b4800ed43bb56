use chrono::{NaiveDate, NaiveTime};
use tokio::sync::oneshot;
use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::ADMISSIONS_TOTAL;

use super::conflict::{
    check_day_capacity, check_interval_free, check_slot_free, validate_interval, validate_text,
};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Create or replace a weekly availability window for a doctor. Driven
    /// by the external admin surface; the engine validates and records it.
    pub async fn set_template(
        &self,
        id: Ulid,
        doctor_id: Ulid,
        weekday: Weekday,
        start: NaiveTime,
        end: NaiveTime,
        active: bool,
    ) -> Result<(), EngineError> {
        let span = validate_interval(start, end)?;
        let key = ResourceIdentity::Doctor(doctor_id);
        let rs = self.resource_state(key);
        let mut guard = rs.write().await;
        if guard.templates.len() >= MAX_TEMPLATES_PER_RESOURCE
            && !guard.templates.iter().any(|t| t.id == id)
        {
            return Err(EngineError::LimitExceeded("too many templates on resource"));
        }

        let event = Event::TemplateSet {
            id,
            doctor_id,
            weekday,
            span,
            active,
        };
        self.persist_and_apply(key, &mut guard, &event).await
    }

    pub async fn remove_template(&self, id: Ulid) -> Result<(), EngineError> {
        let (key, mut guard) = self.resolve_entity_write(&id).await?;
        if !guard.templates.iter().any(|t| t.id == id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::TemplateRemoved {
            id,
            doctor_id: key.id(),
        };
        self.persist_and_apply(key, &mut guard, &event).await
    }

    /// Book a patient appointment into one grid slot. The admission check
    /// and the insert run under the doctor's write lock: of N concurrent
    /// bookings for the same (doctor, date, time), exactly one is admitted.
    ///
    /// The requested time is deliberately not required to fall inside a
    /// template window or on the grid — only exact-triple occupancy rejects.
    #[allow(clippy::too_many_arguments)]
    pub async fn book_slot(
        &self,
        id: Ulid,
        patient_id: Ulid,
        doctor_id: Ulid,
        department: Option<String>,
        date: NaiveDate,
        time: NaiveTime,
        notes: Option<String>,
    ) -> Result<(), EngineError> {
        validate_text("department", department.as_deref(), MAX_DEPARTMENT_LEN)?;
        validate_text("notes", notes.as_deref(), MAX_NOTES_LEN)?;

        let key = ResourceIdentity::Doctor(doctor_id);
        let rs = self.resource_state(key);
        let mut guard = rs.write().await;
        check_day_capacity(&guard, date)?;

        if let Err(e) = check_slot_free(&guard, date, time) {
            metrics::counter!(ADMISSIONS_TOTAL, "op" => "book_slot", "outcome" => "conflict")
                .increment(1);
            return Err(e);
        }

        let event = Event::AppointmentBooked {
            id,
            doctor_id,
            patient_id,
            department,
            date,
            time,
            status: AppointmentStatus::Scheduled,
            notes,
        };
        self.persist_and_apply(key, &mut guard, &event).await?;
        metrics::counter!(ADMISSIONS_TOTAL, "op" => "book_slot", "outcome" => "admitted")
            .increment(1);
        debug!("booked appointment {id} with doctor {doctor_id} on {date} at {time}");
        Ok(())
    }

    /// Assign a duty shift over an arbitrary interval. Same lock discipline
    /// as `book_slot`; the conflict error names the overlapping shift.
    pub async fn assign_shift(
        &self,
        id: Ulid,
        identity: ResourceIdentity,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        remarks: Option<String>,
    ) -> Result<(), EngineError> {
        let span = validate_interval(start, end)?;
        validate_text("remarks", remarks.as_deref(), MAX_REMARKS_LEN)?;

        let rs = self.resource_state(identity);
        let mut guard = rs.write().await;
        check_day_capacity(&guard, date)?;

        if let Err(e) = check_interval_free(&guard, date, &span, None) {
            metrics::counter!(ADMISSIONS_TOTAL, "op" => "assign_shift", "outcome" => "conflict")
                .increment(1);
            return Err(e);
        }

        let event = Event::ShiftAssigned {
            id,
            identity,
            date,
            span,
            remarks,
        };
        self.persist_and_apply(identity, &mut guard, &event).await?;
        metrics::counter!(ADMISSIONS_TOTAL, "op" => "assign_shift", "outcome" => "admitted")
            .increment(1);
        debug!("assigned shift {id} to {identity} on {date} ({span})");
        Ok(())
    }

    /// Move or re-remark an existing shift. Re-runs the overlap check
    /// against the target date, excluding the shift itself.
    pub async fn update_shift(
        &self,
        id: Ulid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        remarks: Option<String>,
    ) -> Result<(), EngineError> {
        let span = validate_interval(start, end)?;
        validate_text("remarks", remarks.as_deref(), MAX_REMARKS_LEN)?;

        let (key, mut guard) = self.resolve_entity_write(&id).await?;
        match guard.find_allocation(id) {
            Some((_, alloc)) if alloc.is_shift() => {}
            _ => return Err(EngineError::NotFound(id)),
        }

        if let Err(e) = check_interval_free(&guard, date, &span, Some(id)) {
            metrics::counter!(ADMISSIONS_TOTAL, "op" => "update_shift", "outcome" => "conflict")
                .increment(1);
            return Err(e);
        }

        let event = Event::ShiftUpdated {
            id,
            identity: key,
            date,
            span,
            remarks,
        };
        self.persist_and_apply(key, &mut guard, &event).await?;
        metrics::counter!(ADMISSIONS_TOTAL, "op" => "update_shift", "outcome" => "admitted")
            .increment(1);
        Ok(())
    }

    /// Unconditional status overwrite, matching the reference behavior:
    /// any of the three statuses may be set at any time, including out of
    /// Completed/Cancelled.
    pub async fn update_status(
        &self,
        id: Ulid,
        status: AppointmentStatus,
    ) -> Result<(), EngineError> {
        let (key, mut guard) = self.resolve_entity_write(&id).await?;
        match guard.find_allocation(id) {
            Some((_, alloc)) if alloc.is_appointment() => {}
            _ => return Err(EngineError::NotFound(id)),
        }

        let event = Event::AppointmentStatusChanged {
            id,
            doctor_id: key.id(),
            status,
        };
        self.persist_and_apply(key, &mut guard, &event).await
    }

    /// Hard-delete an allocation (appointment or shift) by id. Not a soft
    /// cancel: a second release of the same id is `NotFound`.
    pub async fn release(&self, id: Ulid) -> Result<(), EngineError> {
        let (key, mut guard) = self.resolve_entity_write(&id).await?;
        let event = match guard.find_allocation(id) {
            Some((_, alloc)) if alloc.is_appointment() => Event::AppointmentDeleted {
                id,
                doctor_id: key.id(),
            },
            Some((_, alloc)) if alloc.is_shift() => Event::ShiftDeleted { id, identity: key },
            _ => return Err(EngineError::NotFound(id)),
        };
        self.persist_and_apply(key, &mut guard, &event).await?;
        debug!("released allocation {id} on {key}");
        Ok(())
    }

    /// Rewrite the WAL with only the events needed to recreate current
    /// state: one TemplateSet per template, one booking/assignment per live
    /// allocation (appointments carry their current status).
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Compaction runs concurrently with admissions and must wait its
        // turn on each resource's read lock, never holding a map shard
        // guard across the await.
        let mut events = Vec::new();
        for (_, rs) in self.snapshot_resources() {
            let guard = rs.read().await;

            for t in &guard.templates {
                events.push(Event::TemplateSet {
                    id: t.id,
                    doctor_id: guard.key.id(),
                    weekday: t.weekday,
                    span: t.span,
                    active: t.active,
                });
            }
            for (date, day) in &guard.days {
                for alloc in day {
                    match &alloc.kind {
                        AllocationKind::Appointment {
                            patient_id,
                            department,
                            status,
                            notes,
                        } => events.push(Event::AppointmentBooked {
                            id: alloc.id,
                            doctor_id: guard.key.id(),
                            patient_id: *patient_id,
                            department: department.clone(),
                            date: *date,
                            time: alloc.span.start,
                            status: *status,
                            notes: notes.clone(),
                        }),
                        AllocationKind::Shift { remarks } => events.push(Event::ShiftAssigned {
                            id: alloc.id,
                            identity: guard.key,
                            date: *date,
                            span: alloc.span,
                            remarks: remarks.clone(),
                        }),
                    }
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
