//! Service resolution through package-manager hooks.
//!
//! When no cgroup names a unit, the package manager knows which package
//! owns an exe and which init script starts it. Hooks are small executables
//! dropped into the hook directory by packaging; each receives the exe path
//! and writes `TAG|value` records on stdout. Recognized tags: `PACKAGE`,
//! `RC`.
//!
//! For every `RC` script the LSB header decides whether the script runs in
//! the current runlevel, and its pid files decide whether it is the
//! canonical unit for the subject PID. A pidfile hit wins outright and
//! stops the hook chain; runlevel-matching scripts without pid files queue
//! up as fallback candidates.

use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use nr_common::natural_cmp;
use nr_config::Config;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::interp;
use crate::reduce::RestartUnit;

/// Parsed LSB header block of an init script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LsbInfo {
    pub provides: Option<String>,
    /// Runlevel digits from `default-start`.
    pub default_start: Vec<char>,
}

/// Parsed hook stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookOutput {
    pub packages: Vec<String>,
    pub rc_scripts: Vec<String>,
}

/// Everything the resolver needs besides the subject; paths are
/// parameters so tests can point them at fixture trees.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub hook_d: PathBuf,
    pub initd_dir: PathBuf,
    pub runlevel: Option<char>,
    pub verbose: bool,
}

impl ResolveOptions {
    pub fn from_config(config: &Config, verbose: bool) -> Self {
        ResolveOptions {
            hook_d: config.hook_d.clone(),
            initd_dir: PathBuf::from("/etc/init.d"),
            runlevel: current_runlevel(),
            verbose,
        }
    }
}

static PIDFILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9_./-]*/run/[A-Za-z0-9_./-]*\.pid").expect("built-in pattern")
});

/// Resolve the unit(s) behind a stale PID via hooks.
///
/// Interpreter processes are resolved by their primary script rather than
/// the runtime binary; the package owning `/usr/bin/python3` is never the
/// one to restart.
pub fn resolve_pid(pid: u32, exe: &Path, config: &Config, verbose: bool) -> Vec<RestartUnit> {
    let opts = ResolveOptions::from_config(config, verbose);
    let subject = interp::script_source(pid, exe).unwrap_or_else(|| exe.to_path_buf());
    resolve_exe(pid, &subject, &opts)
}

/// Run the hook chain for one exe.
pub fn resolve_exe(pid: u32, exe: &Path, opts: &ResolveOptions) -> Vec<RestartUnit> {
    let mut fallback: Vec<RestartUnit> = Vec::new();

    for hook in list_runnable(&opts.hook_d) {
        let Some(stdout) = run_hook(&hook, exe, opts.verbose) else {
            continue;
        };
        let output = parse_hook_output(&stdout);
        for pkg in &output.packages {
            debug!(exe = %exe.display(), package = %pkg, "hook mapped exe to package");
        }

        for rc in &output.rc_scripts {
            match inspect_init_script(pid, rc, opts) {
                ScriptVerdict::Canonical(unit) => return vec![unit],
                ScriptVerdict::Candidate(unit) => fallback.push(unit),
                ScriptVerdict::Skip => {}
            }
        }
    }

    fallback
}

enum ScriptVerdict {
    /// Pidfile match; this unit is definitive.
    Canonical(RestartUnit),
    /// Runlevel matched (or no header), no pidfile evidence.
    Candidate(RestartUnit),
    Skip,
}

fn inspect_init_script(pid: u32, name: &str, opts: &ResolveOptions) -> ScriptVerdict {
    let path = opts.initd_dir.join(name);
    let Ok(content) = fs::read_to_string(&path) else {
        debug!(script = %path.display(), "init script unreadable");
        return ScriptVerdict::Skip;
    };

    let Some(lsb) = parse_lsb_header(&content) else {
        // No recognizable header: weakest candidate, used only if nothing
        // better matches.
        return ScriptVerdict::Candidate(RestartUnit::InitScript {
            name: name.to_string(),
            has_lsb: false,
            default_start: Vec::new(),
            pidfiles: Vec::new(),
        });
    };

    if let Some(rl) = opts.runlevel {
        if !lsb.default_start.contains(&rl) {
            debug!(script = name, runlevel = %rl, "not started in current runlevel");
            return ScriptVerdict::Skip;
        }
    }

    let pidfiles: Vec<String> = find_pidfiles(&content)
        .into_iter()
        .filter(|p| fs::metadata(p).is_ok())
        .collect();

    if pidfiles.is_empty() {
        return ScriptVerdict::Candidate(RestartUnit::InitScript {
            name: name.to_string(),
            has_lsb: true,
            default_start: lsb.default_start,
            pidfiles,
        });
    }

    for pf in &pidfiles {
        if pidfile_claims(Path::new(pf), pid) {
            return ScriptVerdict::Canonical(RestartUnit::InitScript {
                name: name.to_string(),
                has_lsb: true,
                default_start: lsb.default_start,
                pidfiles,
            });
        }
    }

    // Pid files exist and name some other process.
    debug!(script = name, pid, "pidfiles do not claim subject pid");
    ScriptVerdict::Skip
}

/// Parse the `### BEGIN INIT INFO` block.
///
/// Returns `None` when the block is absent or unterminated.
pub fn parse_lsb_header(content: &str) -> Option<LsbInfo> {
    let mut inside = false;
    let mut seen_end = false;
    let mut info = LsbInfo::default();

    for line in content.lines() {
        if line.starts_with("### BEGIN INIT INFO") {
            inside = true;
            continue;
        }
        if line.starts_with("### END INIT INFO") {
            seen_end = inside;
            break;
        }
        if !inside {
            continue;
        }

        let Some(rest) = line.strip_prefix('#') else {
            continue;
        };
        let Some((key, value)) = rest.split_once(':') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "provides" => info.provides = Some(value.trim().to_string()),
            "default-start" => {
                info.default_start = value
                    .split_whitespace()
                    .filter_map(|tok| {
                        let mut chars = tok.chars();
                        let c = chars.next()?;
                        (chars.next().is_none() && c.is_ascii_alphanumeric()).then_some(c)
                    })
                    .collect();
            }
            _ => {}
        }
    }

    seen_end.then_some(info)
}

/// Pidfile-looking paths referenced by a script body.
pub fn find_pidfiles(content: &str) -> Vec<String> {
    let mut found: Vec<String> = PIDFILE_RE
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .collect();
    found.sort();
    found.dedup();
    found
}

/// Whether a pid file names the subject PID.
fn pidfile_claims(path: &Path, pid: u32) -> bool {
    fs::read_to_string(path)
        .ok()
        .and_then(|c| c.trim().parse::<u32>().ok())
        .is_some_and(|claimed| claimed == pid)
}

/// Parse `TAG|value` hook records; unknown tags are ignored.
pub fn parse_hook_output(stdout: &str) -> HookOutput {
    let mut out = HookOutput::default();

    for line in stdout.lines() {
        let Some((tag, value)) = line.split_once('|') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match tag {
            "PACKAGE" => out.packages.push(value.to_string()),
            "RC" => out.rc_scripts.push(value.to_string()),
            other => debug!(tag = other, "unrecognized hook record"),
        }
    }

    out
}

/// Spawn a hook, drain its stdout to EOF, and always reap it.
fn run_hook(hook: &Path, exe: &Path, verbose: bool) -> Option<String> {
    let mut cmd = Command::new(hook);
    if verbose {
        cmd.arg("-v");
    }
    cmd.arg(exe);

    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| debug!(hook = %hook.display(), error = %e, "hook spawn failed"))
        .ok()?;

    let mut stdout = String::new();
    let read = child
        .stdout
        .take()
        .map(|mut pipe| pipe.read_to_string(&mut stdout));
    let status = child.wait();

    match status {
        Ok(st) if !st.success() => {
            debug!(hook = %hook.display(), status = %st, "hook exited nonzero")
        }
        Err(e) => debug!(hook = %hook.display(), error = %e, "hook wait failed"),
        _ => {}
    }

    match read {
        Some(Ok(_)) => Some(stdout),
        _ => None,
    }
}

/// Executable entries of a directory in natural order.
///
/// Editor backups (`…~`) and dpkg conffile remnants (`.dpkg-*`) are
/// skipped. A missing directory yields an empty list.
pub fn list_runnable(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            if name.ends_with('~') || name.contains(".dpkg-") {
                return None;
            }
            let md = e.metadata().ok()?;
            if !md.is_file() || md.permissions().mode() & 0o111 == 0 {
                return None;
            }
            Some(name)
        })
        .collect();

    names.sort_by(|a, b| natural_cmp(a, b));
    names.into_iter().map(|n| dir.join(n)).collect()
}

/// The current SysV runlevel from `runlevel(8)`, or the RUNLEVEL
/// environment variable. `None` disables runlevel filtering.
pub fn current_runlevel() -> Option<char> {
    if let Ok(output) = Command::new("runlevel").output() {
        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if let Some(rl) = parse_runlevel_output(&stdout) {
                return Some(rl);
            }
        }
    }

    std::env::var("RUNLEVEL")
        .ok()
        .and_then(|v| v.trim().chars().next())
}

/// Parse `runlevel(8)` output of the form `N 3` or `5 3`.
pub fn parse_runlevel_output(stdout: &str) -> Option<char> {
    let current = stdout.split_whitespace().nth(1)?;
    let mut chars = current.chars();
    let c = chars.next()?;
    (chars.next().is_none() && c != 'N').then_some(c)
}
