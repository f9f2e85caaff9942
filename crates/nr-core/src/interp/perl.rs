//! Perl recognizer.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{exe_basename, resolve_script, script_from_argv, Interpreter};

static PERL_EXE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^perl(5[\d.]*)?$").expect("built-in pattern"));

/// `-e`/`-E` run inline code; these take a value argument.
const INLINE_FLAGS: &[&str] = &["-e", "-E"];
const VALUE_FLAGS: &[&str] = &["-I", "-m", "-M", "-x"];

pub struct Perl;

impl Interpreter for Perl {
    fn name(&self) -> &'static str {
        "Perl"
    }

    fn recognizes(&self, exe: &Path) -> bool {
        exe_basename(exe).is_some_and(|name| PERL_EXE.is_match(name))
    }

    fn source_of(&self, pid: u32, argv: &[String]) -> Option<PathBuf> {
        let script = script_from_argv(argv, INLINE_FLAGS, VALUE_FLAGS)?;
        Some(resolve_script(pid, &script))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognizes_versions() {
        let p = Perl;
        assert!(p.recognizes(Path::new("/usr/bin/perl")));
        assert!(p.recognizes(Path::new("/usr/bin/perl5.36.0")));
        assert!(!p.recognizes(Path::new("/usr/bin/perldoc")));
        assert!(!p.recognizes(Path::new("/usr/bin/python3")));
    }

    #[test]
    fn test_source_of_skips_inline() {
        let p = Perl;
        let argv: Vec<String> = ["perl", "-e", "print"].iter().map(|s| s.to_string()).collect();
        assert!(p.source_of(0, &argv).is_none());
    }

    #[test]
    fn test_source_of_absolute_script() {
        let p = Perl;
        let argv: Vec<String> = ["perl", "-w", "/srv/report.pl"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(p.source_of(0, &argv), Some(PathBuf::from("/srv/report.pl")));
    }
}
