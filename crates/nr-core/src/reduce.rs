//! Stale-set reduction.
//!
//! Individual stale PIDs are rarely what an operator restarts; their
//! service is. The reducer collapses stale processes into a minimal set of
//! restart units in two passes: pass 1 walks parent chains (workers fold
//! into the daemon that spawned them) and splits off tty-bound user
//! sessions, pass 2 attributes the surviving candidates to systemd units,
//! SysV init scripts, the init manager itself, or containers.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use nr_config::Config;
use tracing::debug;

use crate::collect::{CgroupUnit, ProcessRecord, Snapshot};

/// The smallest nameable thing an operator can restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartUnit {
    /// A systemd service unit, name includes the `.service` suffix.
    SystemdService(String),
    /// The systemd manager itself (`systemctl daemon-reexec`).
    SystemdManager,
    /// A SysV init as PID 1 (`telinit u`).
    SysVInit,
    /// A SysV init script.
    InitScript {
        name: String,
        has_lsb: bool,
        default_start: Vec<char>,
        pidfiles: Vec<String>,
    },
    /// A container restarted through its runtime.
    Container {
        name: String,
        restart_argv: Vec<String>,
    },
}

impl RestartUnit {
    /// Key in the restart set; duplicates merge on it.
    pub fn name(&self) -> String {
        match self {
            RestartUnit::SystemdService(name) => name.clone(),
            RestartUnit::SystemdManager => "systemd manager".to_string(),
            RestartUnit::SysVInit => "sysvinit".to_string(),
            RestartUnit::InitScript { name, .. } => name.clone(),
            RestartUnit::Container { name, .. } => name.clone(),
        }
    }
}

/// A user session with stale members, keyed by `(uid, session label)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// Stale member PIDs grouped by short command.
    pub commands: BTreeMap<String, Vec<u32>>,
    /// Representative PID for notification helpers.
    pub leader: Option<u32>,
}

/// Reducer output.
#[derive(Debug, Default)]
pub struct Reduction {
    /// Restart units keyed by name.
    pub units: BTreeMap<String, RestartUnit>,
    /// Stale user sessions keyed by `(uid, session label)`.
    pub sessions: BTreeMap<(u32, String), SessionInfo>,
    /// Unit names dropped by overrides, listed for the operator.
    pub skipped: Vec<String>,
    /// Stale processes by short command (user-mode listing).
    pub user_pids: BTreeMap<String, Vec<u32>>,
}

/// Host facts and side-effecting probes the reducer needs.
///
/// Pass 2 attribution asks the host questions (cgroup files, systemctl,
/// package hooks); putting them behind a trait keeps the reduction logic a
/// pure function over the snapshot and lets tests swap in fixtures.
pub trait HostProbe {
    /// Whether systemd is the running init (`/run/systemd/system` exists).
    fn systemd_present(&self) -> bool;
    /// Cgroup-based unit attribution for a PID.
    fn cgroup_unit(&self, pid: u32) -> Option<CgroupUnit>;
    /// `systemctl status <pid>` fallback attribution.
    fn systemctl_unit(&self, pid: u32) -> Option<String>;
    /// Whether the PID lives in a container.
    fn in_container(&self, pid: u32) -> bool;
    /// Hook-based resolution for PIDs no cgroup names (spawns hook scripts).
    fn resolve_units(&self, pid: u32, exe: &Path) -> Vec<RestartUnit>;
}

/// Live host probe reading /proc and spawning systemctl/hooks.
pub struct LiveHost<'a> {
    pub config: &'a Config,
    pub verbose: bool,
}

impl HostProbe for LiveHost<'_> {
    fn systemd_present(&self) -> bool {
        Path::new("/run/systemd/system").is_dir()
    }

    fn cgroup_unit(&self, pid: u32) -> Option<CgroupUnit> {
        crate::collect::unit_for_pid(pid)
    }

    fn systemctl_unit(&self, pid: u32) -> Option<String> {
        crate::collect::systemctl_unit_for_pid(pid)
    }

    fn in_container(&self, pid: u32) -> bool {
        crate::collect::in_container(pid)
    }

    fn resolve_units(&self, pid: u32, exe: &Path) -> Vec<RestartUnit> {
        crate::resolver::resolve_pid(pid, exe, self.config, self.verbose)
    }
}

/// Reduce stale PIDs to restart units and sessions.
pub fn reduce(
    snapshot: &Snapshot,
    stale: &BTreeSet<u32>,
    config: &Config,
    host: &dyn HostProbe,
    euid: u32,
) -> Reduction {
    let root_mode = euid == 0;
    let mut out = Reduction::default();
    let mut candidates: BTreeSet<u32> = BTreeSet::new();

    // Pass 1: fold workers into parents, split off tty sessions.
    for &pid in stale {
        let Some(rec) = snapshot.get(pid) else {
            continue;
        };
        if !root_mode && rec.uid != euid {
            continue;
        }

        if !root_mode {
            out.user_pids.entry(rec.comm.clone()).or_default().push(pid);
        }

        if host.in_container(pid) {
            // Container-resident processes never become host units; the
            // container enumerator picks them up.
            continue;
        }

        if rec.has_tty() && !host.systemd_present() {
            let key = (rec.uid, tty_name(rec.tty_nr));
            let session = out.sessions.entry(key).or_default();
            session.commands.entry(rec.comm.clone()).or_default().push(pid);
            session.leader.get_or_insert(pid);
            continue;
        }

        candidates.insert(collapse_to_ancestor(snapshot, rec));
    }

    if !root_mode {
        return out;
    }

    // Pass 2: attribute candidates to units.
    for pid in candidates {
        let Some(rec) = snapshot.get(pid) else {
            continue;
        };
        attribute(rec, host, &mut out);
    }

    finalize(&mut out, config);
    out
}

/// Walk up the parent chain while ownership stays with the same user.
///
/// Stops below init; a visited set guards against corrupt parent pointers
/// (a zombie reparented to itself). Returns the stale PID itself when its
/// immediate parent belongs to another user.
pub fn collapse_to_ancestor(snapshot: &Snapshot, rec: &ProcessRecord) -> u32 {
    let mut current = rec;
    let mut visited: HashSet<u32> = HashSet::from([rec.pid]);

    loop {
        let ppid = current.ppid;
        if ppid <= 1 || ppid == current.pid || visited.contains(&ppid) {
            return current.pid;
        }
        match snapshot.get(ppid) {
            Some(parent) if parent.uid == rec.uid && !parent.is_kernel_thread() => {
                visited.insert(ppid);
                current = parent;
            }
            _ => return current.pid,
        }
    }
}

/// Pass-2 attribution of one candidate PID.
fn attribute(rec: &ProcessRecord, host: &dyn HostProbe, out: &mut Reduction) {
    let exe = rec.exe.as_ref().map(|e| e.path.as_path());

    if host.systemd_present() {
        if rec.pid == 1 && exe.is_some_and(is_systemd_exe) {
            insert_unit(out, RestartUnit::SystemdManager);
            return;
        }

        match host.cgroup_unit(rec.pid) {
            Some(CgroupUnit::Session { uid, session }) => {
                let key = (uid, format!("session-{}", session));
                let entry = out.sessions.entry(key).or_default();
                entry.commands.entry(rec.comm.clone()).or_default().push(rec.pid);
                entry.leader.get_or_insert(rec.pid);
                return;
            }
            Some(CgroupUnit::UserManager { uid }) => {
                insert_unit(out, RestartUnit::SystemdService(format!("user@{}.service", uid)));
                return;
            }
            Some(CgroupUnit::Service(name)) => {
                insert_unit(out, RestartUnit::SystemdService(name));
                return;
            }
            None => {}
        }

        if let Some(name) = host.systemctl_unit(rec.pid) {
            insert_unit(out, RestartUnit::SystemdService(name));
            return;
        }
    } else if rec.pid == 1 && exe.is_some_and(|e| e.starts_with("/sbin/init")) {
        insert_unit(out, RestartUnit::SysVInit);
        return;
    }

    let Some(exe) = exe else {
        return;
    };
    for unit in host.resolve_units(rec.pid, exe) {
        insert_unit(out, unit);
    }
}

fn is_systemd_exe(exe: &Path) -> bool {
    exe.starts_with("/lib/systemd") || exe.starts_with("/usr/lib/systemd")
}

fn insert_unit(out: &mut Reduction, unit: RestartUnit) {
    let name = unit.name();
    out.units.entry(name).or_insert(unit);
}

/// Apply overrides, blacklists and the `.service`-supersedes-bare rule.
pub fn finalize(out: &mut Reduction, config: &Config) {
    // Bare names superseded by their .service variant.
    let superseded: Vec<String> = out
        .units
        .keys()
        .filter_map(|name| name.strip_suffix(".service"))
        .filter(|bare| out.units.contains_key(*bare))
        .map(|bare| bare.to_string())
        .collect();
    for bare in superseded {
        debug!(unit = %bare, "superseded by its .service variant");
        out.units.remove(&bare);
    }

    let mut dropped: Vec<String> = Vec::new();
    for name in out.units.keys() {
        let overridden = Config::apply_overrides(&config.override_rc, name);
        let keep = match overridden {
            Some(keep) => keep,
            None => !config.unit_blacklisted(name),
        };
        if !keep {
            dropped.push(name.clone());
        }
    }
    for name in dropped {
        out.units.remove(&name);
        out.skipped.push(name);
    }
    out.skipped.sort();
}

/// Resolve a `tty_nr` device number to the conventional device name.
pub fn tty_name(tty_nr: i32) -> String {
    let nr = tty_nr as u32;
    let major = (nr >> 8) & 0xfff;
    let minor = (nr & 0xff) | ((nr >> 12) & 0xfff00);

    match major {
        4 => format!("tty{}", minor),
        136..=143 => format!("pts/{}", minor + (major - 136) * 256),
        _ => format!("dev{}:{}", major, minor),
    }
}
