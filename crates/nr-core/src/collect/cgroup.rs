//! Cgroup membership parsing for unit attribution.
//!
//! Once a stale PID survives the parent-chain collapse, its cgroup path
//! names the systemd unit responsible for it. Recognized shapes:
//!
//! - `user-<uid>.slice/session-<N>.scope`: an interactive user session
//! - `user@<uid>.service`: a per-user service manager
//! - `.../<unit>.service`: a system service
//!
//! When the cgroup file yields nothing, `systemctl status <pid>` is asked
//! and the unit token is pulled from its headline.

use std::fs;
use std::process::Command;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Unit attribution derived from a cgroup path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CgroupUnit {
    /// Interactive session scope of a user.
    Session { uid: u32, session: String },
    /// The `user@<uid>.service` manager instance.
    UserManager { uid: u32 },
    /// A plain service unit, name including the `.service` suffix.
    Service(String),
}

static SESSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"user-(\d+)\.slice/session-([^/]+)\.scope").expect("built-in pattern")
});
static USER_MANAGER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"user@(\d+)\.service").expect("built-in pattern"));
static SERVICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/([^/]+\.service)$").expect("built-in pattern"));

/// Classify a single line of `/proc/[pid]/cgroup`.
///
/// Lines are `hierarchy:controllers:path`; only the path matters here.
pub fn classify_cgroup_line(line: &str) -> Option<CgroupUnit> {
    let path = line.splitn(3, ':').nth(2)?;

    if let Some(caps) = SESSION_RE.captures(path) {
        return Some(CgroupUnit::Session {
            uid: caps[1].parse().ok()?,
            session: caps[2].to_string(),
        });
    }

    if let Some(caps) = USER_MANAGER_RE.captures(path) {
        return Some(CgroupUnit::UserManager {
            uid: caps[1].parse().ok()?,
        });
    }

    if let Some(caps) = SERVICE_RE.captures(path) {
        return Some(CgroupUnit::Service(caps[1].to_string()));
    }

    None
}

/// Attribute a PID to a unit through its cgroup file.
pub fn unit_for_pid(pid: u32) -> Option<CgroupUnit> {
    let content = fs::read_to_string(format!("/proc/{}/cgroup", pid)).ok()?;
    unit_from_content(&content)
}

/// Classify cgroup file content, first recognized line wins.
pub fn unit_from_content(content: &str) -> Option<CgroupUnit> {
    content.lines().find_map(classify_cgroup_line)
}

/// Fallback attribution through `systemctl status <pid>`.
///
/// The first output line reads like `● cron.service - Regular background
/// program processing daemon`; the first `<name>.service` token is the
/// unit.
pub fn systemctl_unit_for_pid(pid: u32) -> Option<String> {
    let output = Command::new("systemctl")
        .args(["status", &pid.to_string()])
        .output()
        .ok()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let unit = parse_systemctl_status_headline(&stdout);
    if unit.is_none() {
        debug!(pid, "systemctl status yielded no unit");
    }
    unit
}

/// Extract the first `<name>.service` token from the first line of
/// `systemctl status` output.
pub fn parse_systemctl_status_headline(output: &str) -> Option<String> {
    let first = output.lines().next()?;
    first
        .split_whitespace()
        .find(|tok| tok.ends_with(".service"))
        .map(|tok| tok.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_service_line() {
        let unit = classify_cgroup_line("1:name=systemd:/system.slice/sshd.service").unwrap();
        assert_eq!(unit, CgroupUnit::Service("sshd.service".into()));
    }

    #[test]
    fn test_classify_v2_service_line() {
        let unit = classify_cgroup_line("0::/system.slice/nginx.service").unwrap();
        assert_eq!(unit, CgroupUnit::Service("nginx.service".into()));
    }

    #[test]
    fn test_classify_session_scope() {
        let unit =
            classify_cgroup_line("0::/user.slice/user-1000.slice/session-4.scope").unwrap();
        assert_eq!(
            unit,
            CgroupUnit::Session {
                uid: 1000,
                session: "4".into()
            }
        );
    }

    #[test]
    fn test_classify_user_manager() {
        let unit =
            classify_cgroup_line("0::/user.slice/user-1000.slice/user@1000.service/init.scope")
                .unwrap();
        assert_eq!(unit, CgroupUnit::UserManager { uid: 1000 });
    }

    #[test]
    fn test_session_beats_user_manager_within_line() {
        // A session scope nested under the user slice is a session, not the
        // manager, even though user@ also appears upstream in some layouts.
        let unit = classify_cgroup_line(
            "0::/user.slice/user-1000.slice/session-c2.scope",
        )
        .unwrap();
        assert!(matches!(unit, CgroupUnit::Session { uid: 1000, .. }));
    }

    #[test]
    fn test_unclassified_lines() {
        assert!(classify_cgroup_line("0::/init.scope").is_none());
        assert!(classify_cgroup_line("7:devices:/").is_none());
        assert!(classify_cgroup_line("garbage").is_none());
    }

    #[test]
    fn test_unit_from_content_first_match() {
        let content = "\
12:pids:/
1:name=systemd:/system.slice/sshd.service
0::/system.slice/cron.service
";
        assert_eq!(
            unit_from_content(content),
            Some(CgroupUnit::Service("sshd.service".into()))
        );
    }

    #[test]
    fn test_parse_systemctl_headline() {
        let output = "● cron.service - Regular background program processing daemon\n   Loaded: loaded\n";
        assert_eq!(
            parse_systemctl_status_headline(output),
            Some("cron.service".into())
        );
    }

    #[test]
    fn test_parse_systemctl_headline_no_unit() {
        assert_eq!(parse_systemctl_status_headline("Failed to get unit\n"), None);
        assert_eq!(parse_systemctl_status_headline(""), None);
    }
}
