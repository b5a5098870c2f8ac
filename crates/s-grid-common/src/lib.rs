//! ---
//! sgrid_section: "01-core-functionality"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Shared primitives and utilities for the core runtime."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
//! Core shared primitives for the S-GRID orchestrator workspace.
//! This crate exposes configuration loading, the injected clock
//! abstraction, and logging bootstrap utilities consumed across the
//! workspace.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{AppConfig, HealthConfig, LoggingConfig, OrchestratorConfig};
pub use logging::{init_tracing, LogFormat};
pub use time::{Clock, ManualClock, SystemClock};
