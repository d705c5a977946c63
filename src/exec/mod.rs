// src/exec/mod.rs

//! Process execution layer.
//!
//! This module owns everything that touches a worker OS process:
//!
//! - [`handle`] wraps one spawned process: liveness, exit status, update and
//!   result channels, resource sampling, termination.
//! - [`protocol`] defines the worker → controller line protocol and the
//!   worker-side [`protocol::Reporter`].
//! - [`signal`] delivers stop signals and tolerates processes that are gone.
//! - [`backend`] provides the [`ProcessBackend`] / [`ManagedProcess`] traits
//!   the scheduler talks to, and the production [`CommandBackend`]. Tests
//!   can swap in a scripted backend that never spawns anything.

pub mod backend;
pub mod handle;
pub mod protocol;
pub mod signal;

pub use backend::{CommandBackend, ManagedProcess, ProcessBackend};
pub use handle::{ExitState, ProcessHandle, ProcessSpec};
pub use signal::StopSignal;
