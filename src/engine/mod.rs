mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use availability::{free_slots, generate_slots};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::directory::Directory;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task owning the WAL. Batches concurrent appends into a single
/// fsync (group commit): buffer the first append, drain whatever else is
/// immediately queued, flush once, answer everyone.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush the batch before the non-append command.
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }
                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even on append error so partially buffered bytes don't leak
    // into the next batch (these callers were already told the batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── Engine ───────────────────────────────────────────────

/// The scheduling engine. Holds per-resource state behind independent
/// `RwLock`s: admissions for different resources never contend, admissions
/// for the same resource serialize on its write lock.
pub struct Engine {
    pub state: DashMap<ResourceIdentity, SharedResourceState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) directory: Arc<dyn Directory>,
    /// Reverse lookup: allocation/template id → owning resource.
    pub(super) entity_index: DashMap<Ulid, ResourceIdentity>,
}

/// Apply an event to a ResourceState. No locking — the caller holds the lock.
fn apply_to_state(
    rs: &mut ResourceState,
    event: &Event,
    entity_index: &DashMap<Ulid, ResourceIdentity>,
) {
    let key = event.identity();
    match event {
        Event::TemplateSet {
            id,
            weekday,
            span,
            active,
            ..
        } => {
            rs.upsert_template(TemplateRule {
                id: *id,
                weekday: *weekday,
                span: *span,
                active: *active,
            });
            entity_index.insert(*id, key);
        }
        Event::TemplateRemoved { id, .. } => {
            rs.remove_template(*id);
            entity_index.remove(id);
        }
        Event::AppointmentBooked {
            id,
            patient_id,
            department,
            date,
            time,
            status,
            notes,
            ..
        } => {
            rs.insert_allocation(
                *date,
                Allocation {
                    id: *id,
                    span: slot_span(*time),
                    kind: AllocationKind::Appointment {
                        patient_id: *patient_id,
                        department: department.clone(),
                        status: *status,
                        notes: notes.clone(),
                    },
                },
            );
            entity_index.insert(*id, key);
        }
        Event::AppointmentStatusChanged { id, status, .. } => {
            if let Some((_, alloc)) = rs.find_allocation_mut(*id)
                && let AllocationKind::Appointment { status: s, .. } = &mut alloc.kind {
                    *s = *status;
                }
        }
        Event::AppointmentDeleted { id, .. } | Event::ShiftDeleted { id, .. } => {
            rs.remove_allocation(*id);
            entity_index.remove(id);
        }
        Event::ShiftAssigned {
            id,
            date,
            span,
            remarks,
            ..
        } => {
            rs.insert_allocation(
                *date,
                Allocation {
                    id: *id,
                    span: *span,
                    kind: AllocationKind::Shift {
                        remarks: remarks.clone(),
                    },
                },
            );
            entity_index.insert(*id, key);
        }
        Event::ShiftUpdated {
            id,
            date,
            span,
            remarks,
            ..
        } => {
            rs.remove_allocation(*id);
            rs.insert_allocation(
                *date,
                Allocation {
                    id: *id,
                    span: *span,
                    kind: AllocationKind::Shift {
                        remarks: remarks.clone(),
                    },
                },
            );
            entity_index.insert(*id, key);
        }
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        directory: Arc<dyn Directory>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            directory,
            entity_index: DashMap::new(),
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds. Never block here: this may run inside an async context.
        for event in &events {
            let rs_arc = engine.resource_state(event.identity());
            let mut guard = rs_arc.try_write().expect("replay: uncontended write");
            apply_to_state(&mut guard, event, &engine.entity_index);
        }
        metrics::gauge!(crate::observability::RESOURCES_ACTIVE).set(engine.state.len() as f64);

        Ok(engine)
    }

    /// Write an event through the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Scheduling state for a resource, created lazily on first touch.
    /// Resource records themselves (doctor/staff CRUD) live elsewhere; the
    /// engine only tracks time allocations, so an unknown id simply has an
    /// empty calendar.
    pub(super) fn resource_state(&self, key: ResourceIdentity) -> SharedResourceState {
        if let Some(entry) = self.state.get(&key) {
            return entry.value().clone();
        }
        let rs = self
            .state
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(ResourceState::new(key))))
            .clone();
        metrics::gauge!(crate::observability::RESOURCES_ACTIVE).set(self.state.len() as f64);
        rs
    }

    /// Read-only state lookup; `None` for resources the engine never saw.
    pub fn get_resource(&self, key: &ResourceIdentity) -> Option<SharedResourceState> {
        self.state.get(key).map(|e| e.value().clone())
    }

    /// Clone out every (key, state) pair before taking any resource lock.
    /// Holding a map shard guard across a lock await can wedge writers that
    /// touch the same shard through `resource_state`, so iteration and
    /// locking never interleave.
    pub(super) fn snapshot_resources(&self) -> Vec<(ResourceIdentity, SharedResourceState)> {
        self.state
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    pub fn resource_for_entity(&self, entity_id: &Ulid) -> Option<ResourceIdentity> {
        self.entity_index.get(entity_id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call, under the caller's lock.
    /// State mutates only after the append succeeds — a WAL failure leaves
    /// no partial admission.
    pub(super) async fn persist_and_apply(
        &self,
        key: ResourceIdentity,
        rs: &mut ResourceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_state(rs, event, &self.entity_index);
        self.notify.send(key, event);
        Ok(())
    }

    /// Lookup entity → resource, then acquire that resource's write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<
        (
            ResourceIdentity,
            tokio::sync::OwnedRwLockWriteGuard<ResourceState>,
        ),
        EngineError,
    > {
        let key = self
            .resource_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let rs = self
            .get_resource(&key)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let guard = rs.write_owned().await;
        Ok((key, guard))
    }
}
