//! Container detection.
//!
//! Stale processes inside a container are not the host's to restart; the
//! container itself becomes the restart unit. Detection combines cgroup
//! path patterns (docker, podman, lxc, systemd-nspawn, kubepods) with a
//! pid-namespace comparison against PID 1.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use nr_config::OverrideRule;
use tracing::debug;

use super::proc_table::Snapshot;

/// Container runtime recognized from a cgroup path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    Docker,
    Podman,
    Lxc,
    Nspawn,
    Generic,
}

/// A process attributed to a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHit {
    pub runtime: ContainerRuntime,
    /// Short display name (container name, or first 12 id characters).
    pub name: String,
}

impl ContainerHit {
    /// Command line that restarts this container.
    pub fn restart_argv(&self) -> Vec<String> {
        let argv: &[&str] = match self.runtime {
            ContainerRuntime::Docker => &["docker", "restart"],
            ContainerRuntime::Podman => &["podman", "restart"],
            ContainerRuntime::Lxc => &["lxc", "restart"],
            ContainerRuntime::Nspawn => &["machinectl", "reboot"],
            ContainerRuntime::Generic => &["echo", "no restart command for"],
        };
        argv.iter()
            .map(|s| s.to_string())
            .chain(std::iter::once(self.name.clone()))
            .collect()
    }
}

/// Detect a container from one cgroup path.
pub fn detect_container_from_cgroup(path: &str) -> Option<ContainerHit> {
    if let Some(id) = extract_after(path, "/docker/").or_else(|| extract_scope(path, "docker-")) {
        return Some(hit(ContainerRuntime::Docker, short_id(&id)));
    }
    if let Some(id) = extract_scope(path, "libpod-") {
        return Some(hit(ContainerRuntime::Podman, short_id(&id)));
    }
    if let Some(name) = extract_after(path, "/lxc/").or_else(|| extract_after(path, "lxc.payload."))
    {
        return Some(hit(ContainerRuntime::Lxc, name));
    }
    if let Some(name) = extract_scope(path, "machine-") {
        return Some(hit(ContainerRuntime::Nspawn, name));
    }
    if path.contains("kubepods") {
        let id = path
            .rsplit('/')
            .next()
            .map(|last| {
                last.trim_start_matches("cri-containerd-")
                    .trim_start_matches("crio-")
                    .trim_start_matches("docker-")
                    .trim_end_matches(".scope")
            })
            .filter(|id| is_container_id(id))
            .map(short_id)
            .unwrap_or_else(|| "kubepod".to_string());
        return Some(hit(ContainerRuntime::Generic, id));
    }

    None
}

fn hit(runtime: ContainerRuntime, name: impl Into<String>) -> ContainerHit {
    ContainerHit {
        runtime,
        name: name.into(),
    }
}

/// First path component after a marker, e.g. `/docker/<id>/...` -> `<id>`.
fn extract_after(path: &str, marker: &str) -> Option<String> {
    let idx = path.find(marker)?;
    let after = &path[idx + marker.len()..];
    let name = after.split('/').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Scope-style component, e.g. `.../docker-<id>.scope` -> `<id>`.
fn extract_scope(path: &str, prefix: &str) -> Option<String> {
    for part in path.split('/') {
        if let Some(rest) = part.strip_prefix(prefix) {
            let id = rest.strip_suffix(".scope").unwrap_or(rest);
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
    }
    None
}

fn is_container_id(s: &str) -> bool {
    s.len() >= 12 && s.len() <= 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn short_id(id: &str) -> String {
    if is_container_id(id) {
        id[..12.min(id.len())].to_string()
    } else {
        id.to_string()
    }
}

/// Attribute a live PID to a container through its cgroup file.
pub fn container_of_pid(pid: u32) -> Option<ContainerHit> {
    let content = fs::read_to_string(format!("/proc/{}/cgroup", pid)).ok()?;
    container_from_content(&content)
}

/// Scan cgroup file content for container patterns.
pub fn container_from_content(content: &str) -> Option<ContainerHit> {
    content.lines().find_map(|line| {
        let path = line.splitn(3, ':').nth(2)?;
        detect_container_from_cgroup(path)
    })
}

/// Whether a PID runs in a pid namespace different from PID 1's.
fn pidns_differs(pid: u32) -> bool {
    let own = fs::read_link(format!("/proc/{}/ns/pid", pid));
    let init = fs::read_link("/proc/1/ns/pid");
    match (own, init) {
        (Ok(a), Ok(b)) => a != b,
        _ => false,
    }
}

/// Whether a PID lives inside a container.
pub fn in_container(pid: u32) -> bool {
    container_of_pid(pid).is_some() || pidns_differs(pid)
}

/// Whether PID 1 itself is containerized (the whole host view is a
/// container; kernel checks are meaningless there).
pub fn pid1_in_container() -> bool {
    if container_of_pid(1).is_some() {
        return true;
    }
    environ_has_container_var(Path::new("/proc/1/environ"))
}

fn environ_has_container_var(path: &Path) -> bool {
    let Ok(raw) = fs::read(path) else {
        return false;
    };
    raw.split(|&b| b == 0)
        .any(|var| var.starts_with(b"container="))
}

/// Containers needing a restart: those holding at least one stale PID.
///
/// `override_cont` rules force-include (`true`) or drop (`false`) matching
/// container names; unmatched names are kept.
pub fn enumerate_containers(
    _snapshot: &Snapshot,
    stale_pids: &[u32],
    overrides: &[OverrideRule],
) -> BTreeMap<String, Vec<String>> {
    let mut containers = BTreeMap::new();

    for &pid in stale_pids {
        let Some(hit) = container_of_pid(pid) else {
            continue;
        };
        if nr_config::Config::apply_overrides(overrides, &hit.name) == Some(false) {
            debug!(pid, name = %hit.name, "container dropped by override");
            continue;
        }
        containers
            .entry(hit.name.clone())
            .or_insert_with(|| hit.restart_argv());
    }

    containers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_docker_path() {
        let hit = detect_container_from_cgroup(
            "/docker/abc123def456789012345678901234567890123456789012345678901234",
        )
        .unwrap();
        assert_eq!(hit.runtime, ContainerRuntime::Docker);
        assert_eq!(hit.name, "abc123def456");
    }

    #[test]
    fn test_detect_docker_scope() {
        let hit = detect_container_from_cgroup(
            "/system.slice/docker-abc123def456789012345678901234567890123456789012345678901234.scope",
        )
        .unwrap();
        assert_eq!(hit.runtime, ContainerRuntime::Docker);
        assert_eq!(hit.restart_argv()[..2], ["docker", "restart"]);
    }

    #[test]
    fn test_detect_podman() {
        let hit = detect_container_from_cgroup(
            "/machine.slice/libpod-abc123def456789012345678901234567890123456789012345678901234.scope",
        )
        .unwrap();
        assert_eq!(hit.runtime, ContainerRuntime::Podman);
    }

    #[test]
    fn test_detect_lxc() {
        let hit = detect_container_from_cgroup("/lxc/web01/init.scope").unwrap();
        assert_eq!(hit.runtime, ContainerRuntime::Lxc);
        assert_eq!(hit.name, "web01");
    }

    #[test]
    fn test_detect_nspawn() {
        let hit = detect_container_from_cgroup("/machine.slice/machine-buildbox.scope").unwrap();
        assert_eq!(hit.runtime, ContainerRuntime::Nspawn);
        assert_eq!(hit.restart_argv(), ["machinectl", "reboot", "buildbox"]);
    }

    #[test]
    fn test_detect_kubepods() {
        let hit = detect_container_from_cgroup(
            "/kubepods.slice/kubepods-besteffort.slice/kubepods-besteffort-podx.slice/crio-abc123def456789012345678901234567890123456789012345678901234.scope",
        )
        .unwrap();
        assert_eq!(hit.runtime, ContainerRuntime::Generic);
        assert_eq!(hit.name, "abc123def456");
    }

    #[test]
    fn test_host_paths_not_containers() {
        assert!(detect_container_from_cgroup("/user.slice/user-1000.slice/session-1.scope")
            .is_none());
        assert!(detect_container_from_cgroup("/system.slice/sshd.service").is_none());
        assert!(detect_container_from_cgroup("/").is_none());
    }

    #[test]
    fn test_container_from_content() {
        let content = "\
12:pids:/
0::/docker/abc123def456789012345678901234567890123456789012345678901234
";
        let hit = container_from_content(content).unwrap();
        assert_eq!(hit.runtime, ContainerRuntime::Docker);
    }

    #[test]
    fn test_environ_container_var() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("environ");

        std::fs::write(&path, b"TERM=dumb\0container=lxc\0HOME=/root\0").expect("write");
        assert!(environ_has_container_var(&path));

        std::fs::write(&path, b"TERM=dumb\0HOME=/root\0").expect("write");
        assert!(!environ_has_container_var(&path));

        assert!(!environ_has_container_var(Path::new("/nonexistent/environ")));
    }
}
