//! ---
//! sgrid_section: "03-lifecycle-modeling"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Lifecycle naming, transition notation, and next-hop search."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use thiserror::Error;

/// Errors raised while building or querying lifecycle state machines.
///
/// Every variant indicates a defect in a lifecycle definition or in the
/// caller, never a transient runtime condition; callers abort the current
/// pass instead of retrying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Lifecycle names are bare identifiers; the underscore is reserved as
    /// the name/suffix separator in state names.
    #[error("lifecycle name {0:?} must be a non-empty identifier without underscores")]
    InvalidName(String),

    /// A state name did not follow the `<name>_<suffix>` rule of its
    /// owning lifecycle.
    #[error("state {state:?} violates the {name:?} naming rule (expected \"{name}_<suffix>\")")]
    NamingViolation { name: String, state: String },

    /// The transition notation contained a token combination outside the
    /// documented grammar.
    #[error("unspecified lifecycle notation near {0:?}")]
    UnspecifiedNotation(String),

    /// A state was queried that has no adjacency entry in the compiled
    /// graph.
    #[error("state {0:?} has no adjacency entry in the lifecycle graph")]
    UnknownState(String),
}
