//! ---
//! sgrid_section: "05-observed-state"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Observed state records and the versioned state store seam."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
//! Observed state of the service grid.
//!
//! Agents, services, and instances each report a state record into an
//! external versioned store. The orchestrator only ever reads these
//! records; task consumers write them back under optimistic concurrency.
//! This crate defines the records, the store seam, an in-memory store for
//! single-process deployments and tests, and the scoped capability handle
//! used by impersonating task handlers.

mod error;
mod progress;
mod record;
mod store;

pub use error::StateError;
pub use progress::{AgentProgress, ServiceProgress};
pub use record::{AgentState, ServiceInstanceState, ServiceState, StateRecord};
pub use store::{
    ImpersonatedState, MemoryStateStore, StateReader, StateStore, StateVersion, VersionedRecord,
};
