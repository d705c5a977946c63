//! Host capacity detection.
//!
//! Detected once per process and only used to fill configuration defaults;
//! the scheduler itself never reads these values.

use std::fs;
use std::sync::OnceLock;

static HOST: OnceLock<HostResources> = OnceLock::new();

/// Usable CPU count and physical memory of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostResources {
    pub cpu_count: usize,
    /// Total physical memory in bytes.
    pub total_memory: u64,
}

impl HostResources {
    /// Detect host resources, cached after the first call.
    pub fn global() -> &'static HostResources {
        HOST.get_or_init(HostResources::detect)
    }

    pub fn detect() -> Self {
        // Physical cores, but never more than this process may actually use.
        let cpu_count = num_cpus::get_physical().min(num_cpus::get()).max(1);
        let total_memory = meminfo_total().or_else(sysconf_total).unwrap_or(0);
        Self {
            cpu_count,
            total_memory,
        }
    }

    /// 60% of physical memory.
    pub fn default_max_memory(&self) -> u64 {
        (self.total_memory as f64 * 0.6) as u64
    }

    /// 80% of physical memory.
    pub fn default_hard_limit(&self) -> u64 {
        (self.total_memory as f64 * 0.8) as u64
    }
}

fn meminfo_total() -> Option<u64> {
    let contents = fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo_total(&contents)
}

fn parse_meminfo_total(contents: &str) -> Option<u64> {
    let line = contents.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kib = line.split_whitespace().nth(1)?.parse::<u64>().ok()?;
    Some(kib * 1024)
}

fn sysconf_total() -> Option<u64> {
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if pages <= 0 || page_size <= 0 {
        None
    } else {
        Some(pages as u64 * page_size as u64)
    }
}
