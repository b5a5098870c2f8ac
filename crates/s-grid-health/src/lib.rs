//! ---
//! sgrid_section: "07-resilience-fault-tolerance"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Agent liveness probe and ping scheduling."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
//! Agent liveness probing for S-GRID.
//!
//! The probe never talks to agents directly: it correlates the newest
//! answered ping recorded in an agent's state with the pings still
//! pending on the task transport. Restart generation counters stamped
//! into each ping let it discard evidence that predates a machine or
//! agent restart.

mod probe;

pub use probe::{AgentHealth, AgentHealthProbe, HealthError};
