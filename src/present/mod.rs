// src/present/mod.rs

//! Presentation collaborators.
//!
//! The run loop hands a [`StatusSnapshot`] to a [`Presenter`] once per tick
//! and polls it for control [`Command`]s. Implementations are picked once at
//! startup from [`PresenterKind`].

pub mod headless;
pub mod printer;

use crate::config::ConfigPatch;
use crate::engine::StatusSnapshot;
use crate::errors::Result;
use crate::types::PresenterKind;

pub use headless::HeadlessPresenter;
pub use printer::PrintPresenter;

/// Control requests a presenter (or a signal handler) can send the run loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Stop admitting; finish once running tasks have drained.
    Stop,
    /// SIGTERM every worker and its children, then end the run.
    Terminate,
    /// SIGKILL every worker and its children, then end the run.
    Kill,
    /// Apply a limits patch (re-validated before use).
    UpdateConfig(ConfigPatch),
}

pub trait Presenter: Send {
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self);

    fn update(&mut self, snapshot: &StatusSnapshot);

    /// Commands issued since the last call, if any.
    fn get_commands(&mut self) -> Option<Vec<Command>>;
}

pub fn from_kind(kind: PresenterKind) -> Box<dyn Presenter> {
    match kind {
        PresenterKind::Print => Box::new(PrintPresenter::stdout()),
        PresenterKind::Headless => Box::new(HeadlessPresenter::default()),
    }
}

/// Human-readable byte count using binary units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
