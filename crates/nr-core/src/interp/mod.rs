//! Interpreter recognition.
//!
//! A language runtime never maps its scripts into memory, so the map
//! inspection cannot see a replaced script. Each recognizer knows one
//! runtime family, finds the script files a process has loaded, and the
//! check compares their mtimes against the process start time; a script
//! newer than its interpreter process means the code on disk moved on.
//!
//! The registry is a static, priority-ordered table; recognizers register
//! by being listed here. Recognizer failures are swallowed: the PID simply
//! falls through to plain binary analysis.

mod perl;
mod python;
mod ruby;

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use tracing::debug;

pub use perl::Perl;
pub use python::Python;
pub use ruby::Ruby;

/// A single language-runtime recognizer.
pub trait Interpreter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this exe is an interpreter of this family.
    fn recognizes(&self, exe: &Path) -> bool;

    /// The primary script the runtime is executing, if any.
    fn source_of(&self, pid: u32, argv: &[String]) -> Option<PathBuf>;

    /// Script files the process has loaded, with mtimes in epoch seconds.
    ///
    /// The default is the primary script alone; recognizers may add more.
    fn files(&self, pid: u32, argv: &[String]) -> BTreeMap<PathBuf, i64> {
        let mut files = BTreeMap::new();
        if let Some(script) = self.source_of(pid, argv) {
            if let Some(mtime) = mtime_of(&script) {
                files.insert(script, mtime);
            }
        }
        files
    }
}

static REGISTRY: Lazy<Vec<Box<dyn Interpreter>>> =
    Lazy::new(|| vec![Box::new(Perl), Box::new(Python), Box::new(Ruby)]);

/// The registered recognizers, in priority order.
pub fn registry() -> &'static [Box<dyn Interpreter>] {
    &REGISTRY
}

/// Find the recognizer claiming this exe.
pub fn recognizer_for(exe: &Path) -> Option<&'static dyn Interpreter> {
    REGISTRY
        .iter()
        .find(|i| i.recognizes(exe))
        .map(|b| b.as_ref())
}

/// Interpreter staleness check.
///
/// True iff the first recognizer claiming the exe reports a script file
/// whose mtime is newer than `start_time_unix` (boot-relative seconds from
/// the same kernel clock the snapshot uses).
pub fn interp_check(pid: u32, exe: &Path, start_time_unix: i64) -> bool {
    let Some(interp) = recognizer_for(exe) else {
        return false;
    };
    let argv = read_cmdline(pid);

    for (path, mtime) in interp.files(pid, &argv) {
        if mtime > start_time_unix {
            debug!(pid, interp = interp.name(), script = %path.display(),
                mtime, start_time_unix, "script newer than process");
            return true;
        }
    }
    false
}

/// The primary script of an interpreter process, for unit resolution.
pub fn script_source(pid: u32, exe: &Path) -> Option<PathBuf> {
    let interp = recognizer_for(exe)?;
    let argv = read_cmdline(pid);
    interp.source_of(pid, &argv)
}

/// Read and split `/proc/[pid]/cmdline`.
pub fn read_cmdline(pid: u32) -> Vec<String> {
    let Ok(raw) = fs::read(format!("/proc/{}/cmdline", pid)) else {
        return Vec::new();
    };
    parse_cmdline(&raw)
}

/// Split NUL-separated cmdline bytes into arguments.
pub fn parse_cmdline(raw: &[u8]) -> Vec<String> {
    raw.split(|&b| b == 0)
        .filter(|a| !a.is_empty())
        .map(|a| String::from_utf8_lossy(a).into_owned())
        .collect()
}

/// Resolve a script argument against the process's working directory.
pub(crate) fn resolve_script(pid: u32, arg: &str) -> PathBuf {
    let path = Path::new(arg);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match fs::read_link(format!("/proc/{}/cwd", pid)) {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

pub(crate) fn mtime_of(path: &Path) -> Option<i64> {
    fs::metadata(path).ok().map(|md| md.mtime())
}

/// Exe basename without version suffix digits, for recognizer matching.
pub(crate) fn exe_basename(exe: &Path) -> Option<&str> {
    exe.file_name()?.to_str()
}

/// Walk argv past interpreter options and return the script argument.
///
/// `inline_flags` mean the code came on the command line (no script file);
/// `value_flags` consume the following argument. `--` ends option parsing.
pub(crate) fn script_from_argv(
    argv: &[String],
    inline_flags: &[&str],
    value_flags: &[&str],
) -> Option<String> {
    let mut args = argv.iter().skip(1);

    while let Some(arg) = args.next() {
        if arg == "--" {
            return args.next().cloned();
        }
        if !arg.starts_with('-') {
            return Some(arg.clone());
        }
        if inline_flags.iter().any(|f| arg == f || arg.starts_with(f)) {
            return None;
        }
        if value_flags.contains(&arg.as_str()) {
            args.next();
        }
    }
    None
}
