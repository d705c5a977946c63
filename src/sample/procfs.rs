//! Minimal readers for Linux `/proc`.
//!
//! Every reader returns `None` when the process (or the file) is gone.

use std::fs;

/// Fields of `/proc/<pid>/stat` we care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcStat {
    pub ppid: u32,
    /// User-mode CPU time in clock ticks.
    pub utime: u64,
    /// Kernel-mode CPU time in clock ticks.
    pub stime: u64,
}

pub fn clock_ticks_per_second() -> Option<f64> {
    let v = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if v <= 0 { None } else { Some(v as f64) }
}

pub fn page_size() -> u64 {
    let v = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if v <= 0 { 4096 } else { v as u64 }
}

pub fn read_stat(pid: u32) -> Option<ProcStat> {
    let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_stat(&stat)
}

/// Parse a `stat` line. The command name may contain spaces and parentheses,
/// so fields are counted from the last `)`.
pub fn parse_stat(stat: &str) -> Option<ProcStat> {
    let rparen = stat.rfind(')')?;
    let after = stat.get(rparen + 2..)?;
    let fields: Vec<&str> = after.split_whitespace().collect();
    // fields[0] is original field 3 (state); ppid is field 4, utime 14, stime 15.
    Some(ProcStat {
        ppid: fields.get(1)?.parse().ok()?,
        utime: fields.get(11)?.parse().ok()?,
        stime: fields.get(12)?.parse().ok()?,
    })
}

/// Proportional set size in bytes, from `smaps_rollup`.
pub fn read_pss(pid: u32) -> Option<u64> {
    let rollup = fs::read_to_string(format!("/proc/{pid}/smaps_rollup")).ok()?;
    parse_kib_field(&rollup, "Pss:")
}

/// Resident set size in bytes, from `statm`.
pub fn read_rss(pid: u32) -> Option<u64> {
    let statm = fs::read_to_string(format!("/proc/{pid}/statm")).ok()?;
    let pages = statm.split_whitespace().nth(1)?.parse::<u64>().ok()?;
    Some(pages * page_size())
}

pub fn parse_kib_field(contents: &str, key: &str) -> Option<u64> {
    let line = contents.lines().find(|l| l.starts_with(key))?;
    let kib = line.split_whitespace().nth(1)?.parse::<u64>().ok()?;
    Some(kib * 1024)
}

/// All pids currently listed in `/proc`.
pub fn list_pids() -> Vec<u32> {
    let Ok(entries) = fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str()?.parse::<u32>().ok())
        .collect()
}

/// Transitive children of `root`, resolved from a single `/proc` scan.
pub fn descendants(root: u32) -> Vec<u32> {
    let parents: Vec<(u32, u32)> = list_pids()
        .into_iter()
        .filter_map(|pid| Some((pid, read_stat(pid)?.ppid)))
        .collect();
    collect_descendants(root, &parents)
}

/// Breadth-first walk over `(pid, ppid)` pairs.
pub fn collect_descendants(root: u32, parents: &[(u32, u32)]) -> Vec<u32> {
    let mut out = Vec::new();
    let mut frontier = vec![root];
    while let Some(parent) = frontier.pop() {
        for &(pid, ppid) in parents {
            if ppid == parent && pid != root && !out.contains(&pid) {
                out.push(pid);
                frontier.push(pid);
            }
        }
    }
    out
}
