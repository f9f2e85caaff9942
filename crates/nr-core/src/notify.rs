//! Session notification dispatch.
//!
//! Users with stale sessions cannot be restarted from here; they get told.
//! Helpers in the notify directory run in natural order with the session
//! facts exported in the environment; the first helper that exits 0 stops
//! the chain (a desktop notification beats a wall broadcast beats a mail).

use std::path::Path;
use std::process::{Command, Stdio};

use nix::unistd::{Uid, User};
use tracing::debug;

use crate::reduce::SessionInfo;
use crate::resolver::list_runnable;

/// Notify one session's owner through the helper chain.
///
/// Returns whether any helper accepted the notification.
pub fn notify_session(
    notify_d: &Path,
    uid: u32,
    session: &str,
    info: &SessionInfo,
) -> bool {
    let username = User::from_uid(Uid::from_raw(uid))
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_else(|| uid.to_string());

    for helper in list_runnable(notify_d) {
        let mut cmd = Command::new(&helper);
        cmd.env("NR_UID", uid.to_string())
            .env("NR_USERNAME", &username)
            .env("NR_SESSION", session)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(leader) = info.leader {
            cmd.env("NR_SESSPPID", leader.to_string());
        }

        let Ok(mut child) = cmd.spawn() else {
            debug!(helper = %helper.display(), "notify helper spawn failed");
            continue;
        };
        match child.wait() {
            Ok(status) if status.success() => {
                debug!(helper = %helper.display(), uid, session, "session notified");
                return true;
            }
            Ok(status) => {
                debug!(helper = %helper.display(), %status, "notify helper declined")
            }
            Err(e) => debug!(helper = %helper.display(), error = %e, "notify wait failed"),
        }
    }

    false
}

/// Notify every stale session.
pub fn notify_all(
    notify_d: &Path,
    sessions: &std::collections::BTreeMap<(u32, String), SessionInfo>,
) {
    for ((uid, session), info) in sessions {
        notify_session(notify_d, *uid, session, info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    fn helper(dir: &Path, name: &str, body: &str) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .mode(0o755)
            .open(dir.join(name))
            .expect("create helper");
        f.write_all(body.as_bytes()).expect("write helper");
    }

    #[test]
    fn test_first_successful_helper_stops_chain() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker_a = dir.path().join("ran-a");
        let marker_b = dir.path().join("ran-b");

        helper(
            dir.path(),
            "10-first",
            &format!("#!/bin/sh\ntouch {}\nexit 0\n", marker_a.display()),
        );
        helper(
            dir.path(),
            "20-second",
            &format!("#!/bin/sh\ntouch {}\nexit 0\n", marker_b.display()),
        );

        let info = SessionInfo {
            leader: Some(42),
            ..Default::default()
        };
        assert!(notify_session(dir.path(), 1000, "tty1", &info));
        assert!(marker_a.exists());
        assert!(!marker_b.exists());
    }

    #[test]
    fn test_failing_helper_falls_through() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("ran-b");

        helper(dir.path(), "10-first", "#!/bin/sh\nexit 1\n");
        helper(
            dir.path(),
            "20-second",
            &format!("#!/bin/sh\ntouch {}\nexit 0\n", marker.display()),
        );

        let info = SessionInfo::default();
        assert!(notify_session(dir.path(), 1000, "pts/0", &info));
        assert!(marker.exists());
    }

    #[test]
    fn test_environment_passed_to_helper() {
        let dir = tempfile::tempdir().expect("tempdir");
        let capture = dir.path().join("env-capture");

        helper(
            dir.path(),
            "10-capture",
            &format!(
                "#!/bin/sh\necho \"$NR_UID $NR_SESSION $NR_SESSPPID\" > {}\nexit 0\n",
                capture.display()
            ),
        );

        let info = SessionInfo {
            leader: Some(4242),
            ..Default::default()
        };
        assert!(notify_session(dir.path(), 1000, "tty3", &info));
        let captured = std::fs::read_to_string(&capture).expect("read capture");
        assert_eq!(captured.trim(), "1000 tty3 4242");
    }

    #[test]
    fn test_no_helpers_returns_false() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(!notify_session(dir.path(), 1000, "tty1", &SessionInfo::default()));
    }
}
