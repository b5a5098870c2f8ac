//! ---
//! sgrid_section: "05-observed-state"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Observed state records and the versioned state store seam."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use thiserror::Error;

/// Defects detected while reading typed state records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A state id resolved to a record of a different kind; the caller
    /// mixed up id namespaces.
    #[error("state {id} holds a {actual} record but a {expected} record was requested")]
    KindMismatch {
        id: String,
        expected: &'static str,
        actual: &'static str,
    },
}
