//! Memory-map staleness inspection.
//!
//! A process is stale when it still executes code whose on-disk file has
//! been replaced or removed. The inspection walks `/proc/[pid]/maps` and
//! compares each executable file-backed mapping against a fresh `stat` of
//! the mapped path, both through the host view and through the process's
//! own root (`/proc/[pid]/root`) for chrooted and namespaced processes.
//!
//! Device numbers are compared as the kernel prints them (`MM:mm`, hex).
//! The decomposition of `st_dev` follows the glibc macro layout; this is
//! Linux/glibc only. A BSD-like `/proc` without map device IDs (`00:00`)
//! and copy-on-write filesystems reporting anonymous `00:xx` devices are
//! accepted as matching.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::proc_table::ExeLink;

/// One line of `/proc/[pid]/maps`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub perms: String,
    /// Device string exactly as printed by the kernel, e.g. `fd:01`.
    pub dev: String,
    pub inode: u64,
    /// Mapped path with any `" (deleted)"` suffix stripped.
    pub path: String,
    /// Whether the kernel flagged the backing file as deleted.
    pub deleted: bool,
}

/// Per-run context for staleness checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaleCheck<'a> {
    /// Exe-path regexes that bypass inspection entirely.
    pub blacklist: &'a [Regex],
}

/// Outcome for a single mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Fresh,
    Stale,
    Skip,
}

/// Pseudo-mappings that never correspond to real files.
static PSEUDO_PATHS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^/SYSV[0-9a-fA-F]{8}$",
        r"^/drm$",
        r"^/dev/",
        r"^/\[aio\]",
        r"^/orcexec\.[0-9a-fA-F]+$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("built-in pattern"))
    .collect()
});

/// Prefixes where a vanished mapping is expected (sockets, runtime state,
/// build scratch) and must not flag the process.
const VOLATILE_PREFIXES: &[&str] = &["/tmp/", "/var/run/", "/run/"];

/// Parse maps content into entries.
///
/// Lines that do not parse are dropped; the kernel's format is stable and a
/// malformed line means a torn read, not data worth keeping.
pub fn parse_maps_content(content: &str) -> Vec<MapEntry> {
    content.lines().filter_map(parse_maps_line).collect()
}

fn parse_maps_line(line: &str) -> Option<MapEntry> {
    // address perms offset dev inode [path...]
    let mut fields = line.splitn(6, ' ').filter(|f| !f.is_empty());
    let _address = fields.next()?;
    let perms = fields.next()?.to_string();
    let _offset = fields.next()?;
    let dev = fields.next()?.to_string();
    let inode: u64 = fields.next()?.parse().ok()?;
    let raw_path = fields.next().map(str::trim).unwrap_or("");

    let (path, deleted) = match raw_path.strip_suffix(" (deleted)") {
        Some(p) => (p.to_string(), true),
        None => (raw_path.to_string(), false),
    };

    Some(MapEntry {
        perms,
        dev,
        inode,
        path,
        deleted,
    })
}

/// Whether a maps device string matches a `stat` device number.
///
/// Three synthesized candidates are accepted: the glibc high/low bit
/// decomposition, the traditional 8/8 major/minor split, and the literal
/// `00:00` of a /proc without device IDs. Any mapping device starting with
/// `00:` matches unconditionally (copy-on-write filesystems report
/// anonymous device IDs there).
pub fn device_matches(map_dev: &str, st_dev: u64) -> bool {
    if map_dev.starts_with("00:") {
        return true;
    }

    let gnu_major = ((st_dev >> 8) & 0xfff) | ((st_dev >> 32) & !0xfff);
    let gnu_minor = (st_dev & 0xff) | ((st_dev >> 12) & !0xff);
    let old_major = (st_dev >> 8) & 0xff;
    let old_minor = st_dev & 0xff;

    let candidates = [
        format!("{:02x}:{:02x}", gnu_major, gnu_minor),
        format!("{:02x}:{:02x}", old_major, old_minor),
        "00:00".to_string(),
    ];

    candidates.iter().any(|c| c == map_dev)
}

fn is_pseudo_path(path: &str) -> bool {
    PSEUDO_PATHS.iter().any(|re| re.is_match(path))
}

fn is_volatile_path(path: &str) -> bool {
    VOLATILE_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Judge a single mapping against the filesystem.
///
/// `proc_root` is the process's own root view (`/proc/[pid]/root`); both it
/// and the host path are stat candidates, and a single match on either
/// declares the mapping fresh.
pub fn entry_verdict(entry: &MapEntry, proc_root: Option<&Path>) -> Verdict {
    if entry.inode == 0 || entry.path.is_empty() {
        return Verdict::Skip;
    }
    if !entry.perms.contains('x') {
        return Verdict::Skip;
    }
    if is_pseudo_path(&entry.path) {
        return Verdict::Skip;
    }

    let mut candidates: Vec<PathBuf> = Vec::with_capacity(2);
    if let Some(root) = proc_root {
        candidates.push(root.join(entry.path.trim_start_matches('/')));
    }
    candidates.push(PathBuf::from(&entry.path));

    let stats: Vec<fs::Metadata> = candidates
        .iter()
        .filter_map(|p| fs::metadata(p).ok())
        .collect();

    if stats.is_empty() {
        // Vanished on both views. Runtime directories churn constantly.
        if is_volatile_path(&entry.path) {
            return Verdict::Skip;
        }
        return Verdict::Stale;
    }

    for md in &stats {
        if md.ino() == entry.inode && device_matches(&entry.dev, md.dev()) {
            return Verdict::Fresh;
        }
    }

    Verdict::Stale
}

/// Classify a process as stale from its exe marker and executable mappings.
pub fn is_stale(pid: u32, exe: &ExeLink, check: &StaleCheck) -> bool {
    let exe_str = exe.path.to_string_lossy();
    if check.blacklist.iter().any(|re| re.is_match(&exe_str)) {
        debug!(pid, exe = %exe_str, "exe blacklisted, skipping inspection");
        return false;
    }

    if exe.deleted {
        debug!(pid, exe = %exe_str, "exe symlink carries deleted marker");
        return true;
    }

    let Ok(content) = fs::read_to_string(format!("/proc/{}/maps", pid)) else {
        return false;
    };
    let proc_root = PathBuf::from(format!("/proc/{}/root", pid));

    for entry in parse_maps_content(&content) {
        if entry_verdict(&entry, Some(&proc_root)) == Verdict::Stale {
            debug!(pid, path = %entry.path, dev = %entry.dev, inode = entry.inode,
                "stale mapping");
            return true;
        }
    }

    false
}
