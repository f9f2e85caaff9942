//! Ruby recognizer.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{exe_basename, resolve_script, script_from_argv, Interpreter};

static RUBY_EXE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ruby(\d+(\.\d+)*)?$").expect("built-in pattern"));

const INLINE_FLAGS: &[&str] = &["-e"];
const VALUE_FLAGS: &[&str] = &["-I", "-r", "-C", "-E"];

pub struct Ruby;

impl Interpreter for Ruby {
    fn name(&self) -> &'static str {
        "Ruby"
    }

    fn recognizes(&self, exe: &Path) -> bool {
        exe_basename(exe).is_some_and(|name| RUBY_EXE.is_match(name))
    }

    fn source_of(&self, pid: u32, argv: &[String]) -> Option<PathBuf> {
        let script = script_from_argv(argv, INLINE_FLAGS, VALUE_FLAGS)?;
        Some(resolve_script(pid, &script))
    }
}
