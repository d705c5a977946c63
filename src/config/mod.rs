// src/config/mod.rs

//! Configuration loading and validation for memsched.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it into an immutable [`RunConfig`] (`validate.rs`).
//! - Detect host capacity once, as an input to defaults (`host.rs`).

pub mod host;
pub mod loader;
pub mod model;
pub mod validate;

pub use host::HostResources;
pub use loader::{load_and_validate, load_from_path};
pub use model::{
    ConfigPatch, Limits, LimitsSection, RawConfigFile, RunConfig, RunSection, TaskConfig,
    TaskSpec, WorkerConfig, WorkerSection,
};
