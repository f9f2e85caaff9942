//! Python recognizer.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{exe_basename, resolve_script, script_from_argv, Interpreter};

static PYTHON_EXE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^python(\d+(\.\d+)*)?$").expect("built-in pattern"));

/// `-c` is inline code, `-m` runs a module we cannot name a file for.
const INLINE_FLAGS: &[&str] = &["-c", "-m"];
const VALUE_FLAGS: &[&str] = &["-W", "-X", "--check-hash-based-pycs"];

pub struct Python;

impl Interpreter for Python {
    fn name(&self) -> &'static str {
        "Python"
    }

    fn recognizes(&self, exe: &Path) -> bool {
        exe_basename(exe).is_some_and(|name| PYTHON_EXE.is_match(name))
    }

    fn source_of(&self, pid: u32, argv: &[String]) -> Option<PathBuf> {
        let script = script_from_argv(argv, INLINE_FLAGS, VALUE_FLAGS)?;
        Some(resolve_script(pid, &script))
    }
}
