//! ---
//! sgrid_section: "05-observed-state"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Observed state records and the versioned state store seam."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::record::{AgentState, ServiceInstanceState, ServiceState, StateRecord};

/// Opaque optimistic-concurrency token attached to every read.
///
/// External task consumers hand it back on writes; inside the core it is
/// only carried, never compared.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct StateVersion(u64);

impl StateVersion {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// A state record together with its version tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedRecord {
    pub record: StateRecord,
    pub version: StateVersion,
}

/// Read seam over the external state store.
pub trait StateReader: Send + Sync {
    /// Latest known record for an id, if any.
    fn get(&self, id: &str) -> Option<VersionedRecord>;

    /// Typed agent read; a record of another kind under the id is a
    /// defect, not a miss.
    fn agent_state(&self, id: &str) -> Result<Option<AgentState>, StateError> {
        self.get(id)
            .map(|versioned| versioned.record.as_agent(id).cloned())
            .transpose()
    }

    /// Typed service read.
    fn service_state(&self, id: &str) -> Result<Option<ServiceState>, StateError> {
        self.get(id)
            .map(|versioned| versioned.record.as_service(id).cloned())
            .transpose()
    }

    /// Typed service instance read.
    fn instance_state(&self, id: &str) -> Result<Option<ServiceInstanceState>, StateError> {
        self.get(id)
            .map(|versioned| versioned.record.as_service_instance(id).cloned())
            .transpose()
    }
}

/// Write seam used by task consumers (and the orchestrator's
/// impersonating handlers through [`ImpersonatedState`]).
pub trait StateStore: StateReader {
    /// Replace the record under `id`, bumping its version.
    fn put(&self, id: &str, record: StateRecord);
}

/// In-memory state store for single-process deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<IndexMap<String, VersionedRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids currently holding a record, in insertion order.
    pub fn ids(&self) -> Vec<String> {
        self.records.lock().keys().cloned().collect()
    }
}

impl StateReader for MemoryStateStore {
    fn get(&self, id: &str) -> Option<VersionedRecord> {
        self.records.lock().get(id).cloned()
    }
}

impl StateStore for MemoryStateStore {
    fn put(&self, id: &str, record: StateRecord) {
        let mut records = self.records.lock();
        let version = records
            .get(id)
            .map(|existing| existing.version.next())
            .unwrap_or_default();
        records.insert(id.to_owned(), VersionedRecord { record, version });
    }
}

/// Capability handle scoped to exactly one state-holder id.
///
/// Impersonating task handlers receive one of these from the dispatcher
/// instead of a general store handle, so a handler can only touch the
/// state the task targets.
pub struct ImpersonatedState<'a> {
    store: &'a dyn StateStore,
    id: &'a str,
}

impl<'a> ImpersonatedState<'a> {
    pub fn new(store: &'a dyn StateStore, id: &'a str) -> Self {
        Self { store, id }
    }

    pub fn id(&self) -> &str {
        self.id
    }

    pub fn get(&self) -> Option<StateRecord> {
        self.store.get(self.id).map(|versioned| versioned.record)
    }

    pub fn agent_state(&self) -> Result<Option<AgentState>, StateError> {
        self.store.agent_state(self.id)
    }

    pub fn service_state(&self) -> Result<Option<ServiceState>, StateError> {
        self.store.service_state(self.id)
    }

    pub fn instance_state(&self) -> Result<Option<ServiceInstanceState>, StateError> {
        self.store.instance_state(self.id)
    }

    pub fn put(&self, record: StateRecord) {
        self.store.put(self.id, record);
    }
}
