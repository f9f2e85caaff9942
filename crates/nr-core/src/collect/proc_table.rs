//! Process table snapshot.
//!
//! One point-in-time walk over `/proc/[pid]` collecting the fields the
//! staleness pipeline needs: parent, owner, start ticks, controlling tty and
//! the `exe` symlink with its deleted marker. Records are immutable once
//! built.

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nr_common::{Error, Result};
use tracing::debug;

/// Resolved `/proc/[pid]/exe` symlink.
///
/// The kernel appends `" (deleted)"` when the backing file is gone; a
/// VServer-style `/proc` prefixes `"(deleted) "` instead. Both markers are
/// recognized, recorded, and stripped from the canonical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExeLink {
    pub path: PathBuf,
    pub deleted: bool,
}

/// Immutable snapshot of a single process.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    /// Process ID.
    pub pid: u32,
    /// Parent process ID.
    pub ppid: u32,
    /// Owning user ID (from the `/proc/[pid]` directory).
    pub uid: u32,
    /// Short command name (comm, without parentheses).
    pub comm: String,
    /// Controlling terminal device number; 0 when none.
    pub tty_nr: i32,
    /// Start time in clock ticks since boot.
    pub start_ticks: u64,
    /// Resolved exe link; `None` marks a kernel thread.
    pub exe: Option<ExeLink>,
}

impl ProcessRecord {
    /// Kernel threads have no readable exe symlink and are excluded from
    /// downstream analysis.
    pub fn is_kernel_thread(&self) -> bool {
        self.exe.is_none()
    }

    pub fn has_tty(&self) -> bool {
        self.tty_nr > 0
    }
}

/// A full process-table snapshot plus the clock anchors needed to convert
/// start ticks into wall-clock seconds.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub processes: BTreeMap<u32, ProcessRecord>,
    /// Boot time in seconds since the epoch (`btime` from `/proc/stat`).
    pub boot_time: i64,
    /// Clock ticks per second.
    pub ticks_per_sec: u64,
}

impl Snapshot {
    /// Wall-clock start time of a process in epoch seconds.
    ///
    /// This is the only clock the pipeline compares against script mtimes;
    /// both sides derive from the same kernel time base.
    pub fn start_time_unix(&self, pid: u32) -> Option<i64> {
        let rec = self.processes.get(&pid)?;
        Some(self.boot_time + (rec.start_ticks / self.ticks_per_sec) as i64)
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessRecord> {
        self.processes.get(&pid)
    }
}

/// Clock ticks per second via sysconf(_SC_CLK_TCK).
pub fn clk_tck() -> u64 {
    let tck = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if tck > 0 {
        tck as u64
    } else {
        100
    }
}

/// Read and classify the exe symlink of a process.
///
/// Returns `None` for kernel threads and processes we may not inspect.
pub fn read_exe(pid: u32) -> Option<ExeLink> {
    let link = fs::read_link(format!("/proc/{}/exe", pid)).ok()?;
    Some(classify_exe_link(&link))
}

/// Split the deleted marker off an exe link value.
pub fn classify_exe_link(link: &Path) -> ExeLink {
    let raw = link.to_string_lossy();

    if let Some(stripped) = raw.strip_suffix(" (deleted)") {
        return ExeLink {
            path: PathBuf::from(stripped),
            deleted: true,
        };
    }
    if let Some(stripped) = raw.strip_prefix("(deleted) ") {
        return ExeLink {
            path: PathBuf::from(stripped),
            deleted: true,
        };
    }

    ExeLink {
        path: link.to_path_buf(),
        deleted: false,
    }
}

/// Fields pulled from `/proc/[pid]/stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatFields {
    pub comm: String,
    pub ppid: u32,
    pub tty_nr: i32,
    pub start_ticks: u64,
}

/// Parse a stat line.
///
/// The comm field is enclosed in parentheses and may itself contain spaces
/// or parentheses, so the split anchors on the first `(` and the last `)`.
pub fn parse_stat_content(content: &str) -> Option<StatFields> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    if close <= open {
        return None;
    }

    let comm = content[open + 1..close].to_string();
    let rest: Vec<&str> = content[close + 1..].split_whitespace().collect();

    // Field indices after comm: state=0, ppid=1, pgrp=2, session=3,
    // tty_nr=4, ..., starttime=19.
    if rest.len() < 20 {
        return None;
    }

    Some(StatFields {
        comm,
        ppid: rest[1].parse().ok()?,
        tty_nr: rest[4].parse().unwrap_or(0),
        start_ticks: rest[19].parse().ok()?,
    })
}

/// Snapshot every process under `/proc`.
///
/// The calling process and its parent are excluded: both are guaranteed to
/// be running the binaries of the invocation itself and would only produce
/// self-referential noise. Per-PID read failures (exit races, permission
/// denials in user mode) skip that PID.
pub fn snapshot() -> Result<Snapshot> {
    let self_pid = std::process::id();
    let parent_pid = nix::unistd::getppid().as_raw() as u32;

    let boot_time = read_boot_time()
        .ok_or_else(|| Error::Snapshot("cannot determine boot time from /proc/stat".into()))?;

    let mut processes = BTreeMap::new();

    let entries = fs::read_dir("/proc").map_err(|e| Error::Snapshot(e.to_string()))?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        if pid == self_pid || pid == parent_pid {
            continue;
        }
        if let Some(rec) = read_process(pid, &entry.path()) {
            processes.insert(pid, rec);
        }
    }

    debug!(count = processes.len(), "process table snapshot complete");

    Ok(Snapshot {
        processes,
        boot_time,
        ticks_per_sec: clk_tck(),
    })
}

fn read_process(pid: u32, dir: &Path) -> Option<ProcessRecord> {
    let stat = fs::read_to_string(dir.join("stat")).ok()?;
    let fields = parse_stat_content(&stat)?;
    let uid = fs::metadata(dir).ok()?.uid();

    Some(ProcessRecord {
        pid,
        ppid: fields.ppid,
        uid,
        comm: fields.comm,
        tty_nr: fields.tty_nr,
        start_ticks: fields.start_ticks,
        exe: read_exe(pid),
    })
}

/// Boot time in epoch seconds from the `btime` line of `/proc/stat`.
pub fn read_boot_time() -> Option<i64> {
    let content = fs::read_to_string("/proc/stat").ok()?;
    parse_btime_content(&content)
}

/// Parse the `btime` line out of `/proc/stat` content.
pub fn parse_btime_content(content: &str) -> Option<i64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|v| v.trim().parse().ok())
}
