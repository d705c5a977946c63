// src/present/printer.rs

use std::io::{self, Write};

use time::macros::format_description;
use tracing::warn;

use crate::engine::StatusSnapshot;
use crate::errors::Result;
use crate::exec::protocol::clock_stamp;
use crate::present::{Command, Presenter, format_bytes};

/// Prints a status block whenever the snapshot's content changes.
#[derive(Debug)]
pub struct PrintPresenter<W: Write + Send> {
    out: W,
    last: Option<String>,
}

impl PrintPresenter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> PrintPresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out, last: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_block(&mut self, block: &str) -> io::Result<()> {
        writeln!(self.out, "{} {block}", clock_stamp())?;
        self.out.flush()
    }
}

/// Render a snapshot without the timestamp line prefix.
pub fn render(snapshot: &StatusSnapshot) -> String {
    let eta = snapshot
        .expected_finish
        .and_then(|t| {
            t.format(format_description!("[hour]:[minute]:[second]"))
                .ok()
        })
        .unwrap_or_else(|| "unknown".to_string());

    let mut text = format!(
        "threads {}/{} | memory {} / {} (expected {}) | cpu {:.0}% | tasks {} done, {} left | eta {}",
        snapshot.active_threads,
        snapshot.thread_cap,
        format_bytes(snapshot.memory_used),
        format_bytes(snapshot.max_memory),
        format_bytes(snapshot.expected_memory),
        snapshot.cpu_percent,
        snapshot.completed_tasks,
        snapshot.remaining_tasks,
        eta,
    );
    if snapshot.evictions > 0 {
        text.push_str(&format!(" | evictions {}", snapshot.evictions));
    }
    if !snapshot.admitting {
        text.push_str(" | draining");
    }
    for slot in &snapshot.slots {
        match slot.task {
            Some(task) => text.push_str(&format!(
                "\n  #{} task {task} ({}): {}",
                slot.index,
                format_bytes(slot.memory),
                slot.latest_update
            )),
            None => text.push_str(&format!("\n  #{} idle", slot.index)),
        }
    }
    text
}

impl<W: Write + Send> Presenter for PrintPresenter<W> {
    fn start(&mut self) -> Result<()> {
        writeln!(self.out, "{} memsched started", clock_stamp())?;
        Ok(())
    }

    fn stop(&mut self) {
        if let Err(err) = self.write_block("memsched stopped") {
            warn!(%err, "failed to write to presenter output");
        }
    }

    fn update(&mut self, snapshot: &StatusSnapshot) {
        let block = render(snapshot);
        if self.last.as_deref() == Some(block.as_str()) {
            return;
        }
        if let Err(err) = self.write_block(&block) {
            warn!(%err, "failed to write to presenter output");
        }
        self.last = Some(block);
    }

    fn get_commands(&mut self) -> Option<Vec<Command>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SlotStatus;

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot {
            slots: vec![
                SlotStatus {
                    index: 0,
                    task: Some(4),
                    latest_update: "[12:00:00] epoch 3".to_string(),
                    memory: 2048,
                },
                SlotStatus {
                    index: 1,
                    task: None,
                    latest_update: "-".to_string(),
                    memory: 0,
                },
            ],
            active_threads: 1,
            thread_cap: 2,
            max_threads: 2,
            memory_used: 2048,
            max_memory: 4096,
            hard_limit: 8192,
            cpu_percent: 99.6,
            expected_memory: 1024,
            completed_tasks: 3,
            remaining_tasks: 5,
            total_tasks: 8,
            evictions: 0,
            expected_finish: None,
            admitting: true,
        }
    }

    #[test]
    fn render_shows_slots_and_unknown_eta() {
        let text = render(&snapshot());
        assert!(text.starts_with("threads 1/2 | memory 2.0 KiB / 4.0 KiB"));
        assert!(text.contains("eta unknown"));
        assert!(text.contains("#0 task 4 (2.0 KiB): [12:00:00] epoch 3"));
        assert!(text.contains("#1 idle"));
    }

    #[test]
    fn unchanged_snapshots_print_once() {
        let mut presenter = PrintPresenter::new(Vec::new());
        presenter.update(&snapshot());
        presenter.update(&snapshot());
        let mut changed = snapshot();
        changed.completed_tasks = 4;
        presenter.update(&changed);

        let out = String::from_utf8(presenter.into_inner()).unwrap();
        assert_eq!(out.matches("threads 1/2").count(), 2);
    }
}
