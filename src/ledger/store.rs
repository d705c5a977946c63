// src/ledger/store.rs

//! Append-only CSV log of completed tasks.
//!
//! One row per completed task. The header is written exactly once per file:
//! on the first append to a file that did not exist (or was empty) when the
//! log was opened. Rows are never rewritten.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

use crate::errors::{MemschedError, Result};
use crate::ledger::task::Task;

/// On-disk row. Durations are seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedRow {
    pub args: String,
    pub metadata: String,
    pub runtime: f64,
    pub memory: u64,
    pub expected_runtime: f64,
    pub expected_memory: u64,
    pub completion_time: String,
    pub remaining_to_do: bool,
}

impl CompletedRow {
    pub fn from_task(task: &Task) -> Self {
        Self {
            args: task.args.clone(),
            metadata: task.metadata.clone(),
            runtime: task.observed_runtime.map(|d| d.as_secs_f64()).unwrap_or(f64::NAN),
            memory: task.observed_memory.unwrap_or(0),
            expected_runtime: task.expected_runtime.as_secs_f64(),
            expected_memory: task.expected_memory,
            completion_time: task
                .completion_time
                .and_then(|t| t.format(&Rfc3339).ok())
                .unwrap_or_default(),
            remaining_to_do: task.remaining_to_do(),
        }
    }
}

#[derive(Debug)]
pub struct CompletedLog {
    path: PathBuf,
    write_header: bool,
}

impl CompletedLog {
    /// Open the log at `path`, returning it with every `args` value already
    /// recorded there.
    pub fn open(path: impl Into<PathBuf>) -> Result<(Self, HashSet<String>)> {
        let path = path.into();
        let has_content = fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

        let completed = if has_content {
            read_completed_args(&path)?
        } else {
            HashSet::new()
        };

        if has_content {
            info!(
                path = %path.display(),
                completed = completed.len(),
                "resuming from existing completed-task log"
            );
        }

        Ok((
            Self {
                path,
                write_header: !has_content,
            },
            completed,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first if this file still needs one.
    pub fn append(&mut self, row: &CompletedRow) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(self.write_header)
            .from_writer(file);
        writer.serialize(row)?;
        writer.flush()?;

        debug!(args = %row.args, header = self.write_header, "appended completed task");
        self.write_header = false;
        Ok(())
    }
}

fn read_completed_args(path: &Path) -> Result<HashSet<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let column = reader
        .headers()?
        .iter()
        .position(|h| h == "args")
        .ok_or_else(|| {
            MemschedError::ConfigError(format!(
                "completed-task log {} has no 'args' column",
                path.display()
            ))
        })?;

    let mut completed = HashSet::new();
    for record in reader.records() {
        let record = record?;
        if let Some(args) = record.get(column) {
            completed.insert(args.to_string());
        }
    }
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(args: &str) -> CompletedRow {
        CompletedRow {
            args: args.to_string(),
            metadata: "m".to_string(),
            runtime: 1.5,
            memory: 2048,
            expected_runtime: 1.0,
            expected_memory: 1024,
            completion_time: "2026-01-01T00:00:00Z".to_string(),
            remaining_to_do: false,
        }
    }

    #[test]
    fn header_written_once_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_completed_tasks.csv");

        let (mut log, done) = CompletedLog::open(&path).unwrap();
        assert!(done.is_empty());
        log.append(&row("1")).unwrap();
        log.append(&row("2")).unwrap();

        let (mut log, done) = CompletedLog::open(&path).unwrap();
        assert_eq!(done.len(), 2);
        log.append(&row("3")).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("args,metadata").count(), 1);
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn empty_existing_file_still_gets_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(&path, "").unwrap();

        let (mut log, done) = CompletedLog::open(&path).unwrap();
        assert!(done.is_empty());
        log.append(&row("x")).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("args,metadata,runtime,memory"));
    }

    #[test]
    fn log_without_args_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(&path, "name,runtime\nfoo,1\n").unwrap();
        assert!(CompletedLog::open(&path).is_err());
    }
}
