//! ---
//! sgrid_section: "02-messaging-ipc-data-model"
//! sgrid_subsection: "module"
//! sgrid_type: "source"
//! sgrid_scope: "code"
//! sgrid_description: "Task schema and transport seams."
//! sgrid_version: "v0.0.0-prealpha"
//! sgrid_owner: "tbd"
//! ---
//! Task schema and transport seams for S-GRID.
//!
//! A task is an idempotent work order addressed to one consumer,
//! optionally impersonating another entity's state. The transport must
//! deliver at least once, in order per consumer, and suppress a submitted
//! task when an equivalent one (equal ignoring producer identity) is
//! already pending; `add_new_task_if_not_exists` relies on that property.

mod broker;
mod task;

pub use broker::{MemoryTaskBroker, TaskReader, TaskSink};
pub use task::{Task, TaskPayload};
