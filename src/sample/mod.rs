// src/sample/mod.rs

//! Resource sampling for worker processes.
//!
//! - [`procfs`] reads raw counters from Linux `/proc`.
//! - [`ResourceSampler`] turns those counters into CPU percentages and memory
//!   figures for one process and, optionally, its children.
//!
//! Processes that exit between enumeration and sampling are not errors:
//! they contribute zero.

pub mod procfs;

use std::collections::HashMap;
use std::time::Instant;

use tracing::trace;

use crate::types::Children;

/// CPU and memory of a process (plus children, if requested) at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    /// Percent of one core; may exceed 100 for multi-threaded workloads.
    pub cpu_percent: f64,
    /// Bytes. Proportional set size for the root process where the kernel
    /// exposes it, resident set size otherwise and for children.
    pub memory: u64,
}

impl std::ops::Add for ResourceUsage {
    type Output = ResourceUsage;

    fn add(self, rhs: ResourceUsage) -> ResourceUsage {
        ResourceUsage {
            cpu_percent: self.cpu_percent + rhs.cpu_percent,
            memory: self.memory + rhs.memory,
        }
    }
}

impl std::iter::Sum for ResourceUsage {
    fn sum<I: Iterator<Item = ResourceUsage>>(iter: I) -> ResourceUsage {
        iter.fold(ResourceUsage::default(), |acc, u| acc + u)
    }
}

#[derive(Debug, Clone, Copy)]
struct CpuMark {
    ticks: u64,
    at: Instant,
}

/// Samples one process, bound to its pid after the process has started.
///
/// CPU usage is measured between consecutive calls, so the first sample of
/// any pid reports 0%.
#[derive(Debug)]
pub struct ResourceSampler {
    pid: u32,
    ticks_per_second: f64,
    marks: HashMap<u32, CpuMark>,
}

impl ResourceSampler {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            ticks_per_second: procfs::clock_ticks_per_second().unwrap_or(100.0),
            marks: HashMap::new(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Current descendants of the sampled process (children, grandchildren, ...).
    pub fn children(&self) -> Vec<u32> {
        procfs::descendants(self.pid)
    }

    /// Resolve a [`Children`] selection to concrete pids right now.
    pub fn resolve_children(&self, children: &Children) -> Vec<u32> {
        match children {
            Children::None => Vec::new(),
            Children::All => self.children(),
            Children::Explicit(pids) => pids.clone(),
        }
    }

    /// Sample the process alone or summed with the selected children.
    pub fn sample(&mut self, children: &Children) -> ResourceUsage {
        let now = Instant::now();
        let child_pids = self.resolve_children(children);

        let root_memory = procfs::read_pss(self.pid)
            .or_else(|| procfs::read_rss(self.pid))
            .unwrap_or(0);
        let mut usage = ResourceUsage {
            cpu_percent: self.cpu_percent(self.pid, now),
            memory: root_memory,
        };

        for &child in &child_pids {
            usage.memory += procfs::read_rss(child).unwrap_or(0);
            usage.cpu_percent += self.cpu_percent(child, now);
        }

        // Forget pids we did not look at this round so the map cannot grow
        // with short-lived grandchildren.
        let root = self.pid;
        self.marks
            .retain(|pid, _| *pid == root || child_pids.contains(pid));

        trace!(
            pid = self.pid,
            children = child_pids.len(),
            memory = usage.memory,
            cpu = usage.cpu_percent,
            "sampled process resources"
        );
        usage
    }

    fn cpu_percent(&mut self, pid: u32, now: Instant) -> f64 {
        let Some(stat) = procfs::read_stat(pid) else {
            self.marks.remove(&pid);
            return 0.0;
        };
        let ticks = stat.utime + stat.stime;

        let percent = match self.marks.get(&pid) {
            Some(mark) => {
                let elapsed = now.duration_since(mark.at).as_secs_f64();
                if elapsed > 0.0 {
                    let used = ticks.saturating_sub(mark.ticks) as f64 / self.ticks_per_second;
                    used / elapsed * 100.0
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        self.marks.insert(pid, CpuMark { ticks, at: now });
        percent
    }
}
