//! ---
//! sgrid_section: "04-deployment-planning"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Declarative deployment plan model and validation."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
use thiserror::Error;

/// Structural defects detected while building a deployment plan.
///
/// A plan failing validation is a defect in the planning layer, never a
/// runtime condition; the previous plan stays installed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("service id must not be empty")]
    EmptyServiceId,

    #[error("service {0} is declared more than once")]
    DuplicateService(String),

    #[error("agent {0} is declared more than once")]
    DuplicateAgent(String),

    #[error("instance {0} is declared more than once")]
    DuplicateInstanceId(String),

    #[error("instance {instance_id} is placed on undeclared agent {agent_id}")]
    UnknownAgent {
        instance_id: String,
        agent_id: String,
    },

    #[error("instance {instance_id} references undeclared service {service_id}")]
    UnknownService {
        instance_id: String,
        service_id: String,
    },

    #[error("service {service_id} plans {planned} instances outside [{min}, {max}]")]
    InstanceCountOutOfBounds {
        service_id: String,
        planned: usize,
        min: usize,
        max: usize,
    },

    #[error("service {service_id} plans {expected} instances but {actual} placements are declared")]
    PlacementCountMismatch {
        service_id: String,
        expected: usize,
        actual: usize,
    },
}
