//! ---
//! sgrid_section: "04-deployment-planning"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Declarative deployment plan model and validation."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
//! Declarative deployment plan model for S-GRID.
//!
//! A [`ServiceGridDeploymentPlan`] is the full desired state: which
//! services run, how many instances each has, and on which agents those
//! instances are placed. Plans are immutable values validated at
//! construction and replaced wholesale on every planning update; lookup
//! helpers are computed on demand instead of maintaining mutable indices.

mod error;
mod grid;
mod service;

pub use error::PlanError;
pub use grid::{AgentPlan, ServiceGridDeploymentPlan, ServiceInstanceDeploymentPlan};
pub use service::{ServiceConfig, ServiceDeploymentPlan};
