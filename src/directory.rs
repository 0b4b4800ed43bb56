use async_trait::async_trait;
use dashmap::DashMap;
use ulid::Ulid;

/// Display-name lookup for people (patients, doctors, staff). Person-record
/// CRUD is owned by an external subsystem; the engine only reads names when
/// building the upcoming-appointments projection, so that is the whole seam.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn display_name(&self, id: Ulid) -> Option<String>;
}

/// In-process directory, used by tests and single-node deployments.
#[derive(Default)]
pub struct InMemoryDirectory {
    names: DashMap<Ulid, String>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: Ulid, name: impl Into<String>) {
        self.names.insert(id, name.into());
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn display_name(&self, id: Ulid) -> Option<String> {
        self.names.get(&id).map(|e| e.value().clone())
    }
}
