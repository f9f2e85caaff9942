//! Typed configuration model.
//!
//! [`RawConfig`] mirrors the file exactly and is what serde sees;
//! [`Config`] is the compiled form with regexes built and defaults filled
//! in. Keeping them separate means a config file round-trips through serde
//! without losing the distinction between "absent" and "default".

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use nr_common::{DetailMode, Error, RestartMode, Result, Verbosity};
use regex::Regex;
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;

/// Kernel hint verbosity.
///
/// The file accepts `true`, `false` or `-1`; `-1` keeps the kernel result
/// lines but drops the human hint text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelHints {
    #[default]
    Full,
    Off,
    Terse,
}

impl KernelHints {
    /// Whether the kernel comparison runs at all.
    pub fn enabled(self) -> bool {
        self != KernelHints::Off
    }
}

impl<'de> Deserialize<'de> for KernelHints {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct HintsVisitor;

        impl Visitor<'_> for HintsVisitor {
            type Value = KernelHints;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("true, false or -1")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<KernelHints, E> {
                Ok(if v { KernelHints::Full } else { KernelHints::Off })
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<KernelHints, E> {
                if v == -1 {
                    Ok(KernelHints::Terse)
                } else {
                    Err(E::custom(format!(
                        "kernelhints must be true, false or -1, got {}",
                        v
                    )))
                }
            }
        }

        deserializer.deserialize_any(HintsVisitor)
    }
}

/// A compiled regex→bool override entry.
///
/// The first rule whose pattern matches decides; non-matching input falls
/// through to the default behavior.
#[derive(Debug, Clone)]
pub struct OverrideRule {
    pub pattern: Regex,
    pub keep: bool,
}

/// On-disk configuration shape. All keys optional; strict about unknowns.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub verbosity: Option<Verbosity>,
    pub hook_d: Option<PathBuf>,
    pub notify_d: Option<PathBuf>,
    pub sendnotify: Option<bool>,
    pub restart: Option<RestartMode>,
    pub defno: Option<bool>,
    pub ui_mode: Option<DetailMode>,
    pub systemctl_combine: Option<bool>,
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub blacklist_rc: Vec<String>,
    #[serde(default)]
    pub override_rc: BTreeMap<String, bool>,
    #[serde(default)]
    pub override_cont: BTreeMap<String, bool>,
    pub interpscan: Option<bool>,
    pub kernelhints: Option<KernelHints>,
}

/// Immutable, fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub verbosity: Verbosity,
    pub hook_d: PathBuf,
    pub notify_d: PathBuf,
    pub sendnotify: bool,
    pub restart: RestartMode,
    pub defno: bool,
    pub ui_mode: DetailMode,
    pub systemctl_combine: bool,
    /// Exe paths matching any of these are never inspected for staleness.
    pub blacklist: Vec<Regex>,
    /// Unit names matching any of these are dropped from the restart set.
    pub blacklist_rc: Vec<Regex>,
    pub override_rc: Vec<OverrideRule>,
    pub override_cont: Vec<OverrideRule>,
    pub interpscan: bool,
    pub kernelhints: KernelHints,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            verbosity: Verbosity::Normal,
            hook_d: PathBuf::from("/etc/needrestart/hook.d"),
            notify_d: PathBuf::from("/etc/needrestart/notify.d"),
            sendnotify: true,
            restart: RestartMode::Interactive,
            defno: false,
            ui_mode: DetailMode::Advanced,
            systemctl_combine: false,
            blacklist: Vec::new(),
            blacklist_rc: Vec::new(),
            override_rc: Vec::new(),
            override_cont: Vec::new(),
            interpscan: true,
            kernelhints: KernelHints::Full,
        }
    }
}

impl Config {
    /// Compile a raw file into the resolved form, filling defaults.
    pub fn from_raw(raw: RawConfig) -> Result<Config> {
        let defaults = Config::default();

        Ok(Config {
            verbosity: raw.verbosity.unwrap_or(defaults.verbosity),
            hook_d: raw.hook_d.unwrap_or(defaults.hook_d),
            notify_d: raw.notify_d.unwrap_or(defaults.notify_d),
            sendnotify: raw.sendnotify.unwrap_or(defaults.sendnotify),
            restart: raw.restart.unwrap_or(defaults.restart),
            defno: raw.defno.unwrap_or(defaults.defno),
            ui_mode: raw.ui_mode.unwrap_or(defaults.ui_mode),
            systemctl_combine: raw.systemctl_combine.unwrap_or(defaults.systemctl_combine),
            blacklist: compile_list("blacklist", &raw.blacklist)?,
            blacklist_rc: compile_list("blacklist_rc", &raw.blacklist_rc)?,
            override_rc: compile_rules("override_rc", &raw.override_rc)?,
            override_cont: compile_rules("override_cont", &raw.override_cont)?,
            interpscan: raw.interpscan.unwrap_or(defaults.interpscan),
            kernelhints: raw.kernelhints.unwrap_or(defaults.kernelhints),
        })
    }

    /// Apply an override rule list to a name. `None` means no rule matched.
    pub fn apply_overrides(rules: &[OverrideRule], name: &str) -> Option<bool> {
        rules
            .iter()
            .find(|r| r.pattern.is_match(name))
            .map(|r| r.keep)
    }

    /// Whether an exe path is excluded from staleness inspection.
    pub fn exe_blacklisted(&self, exe: &str) -> bool {
        self.blacklist.iter().any(|re| re.is_match(exe))
    }

    /// Whether a unit name is blacklisted from the restart set.
    pub fn unit_blacklisted(&self, name: &str) -> bool {
        self.blacklist_rc.iter().any(|re| re.is_match(name))
    }
}

fn compile_list(key: &'static str, patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| Error::ConfigRegex {
                key,
                pattern: p.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

fn compile_rules(key: &'static str, table: &BTreeMap<String, bool>) -> Result<Vec<OverrideRule>> {
    table
        .iter()
        .map(|(p, &keep)| {
            Regex::new(p)
                .map(|pattern| OverrideRule { pattern, keep })
                .map_err(|e| Error::ConfigRegex {
                    key,
                    pattern: p.clone(),
                    message: e.to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.verbosity, Verbosity::Normal);
        assert_eq!(cfg.hook_d, PathBuf::from("/etc/needrestart/hook.d"));
        assert!(cfg.sendnotify);
        assert_eq!(cfg.restart, RestartMode::Interactive);
        assert!(cfg.interpscan);
        assert_eq!(cfg.kernelhints, KernelHints::Full);
        assert!(!cfg.systemctl_combine);
    }

    #[test]
    fn test_kernelhints_forms() {
        #[derive(Deserialize)]
        struct Probe {
            kernelhints: KernelHints,
        }

        let full: Probe = toml::from_str("kernelhints = true").unwrap();
        assert_eq!(full.kernelhints, KernelHints::Full);

        let off: Probe = toml::from_str("kernelhints = false").unwrap();
        assert_eq!(off.kernelhints, KernelHints::Off);
        assert!(!off.kernelhints.enabled());

        let terse: Probe = toml::from_str("kernelhints = -1").unwrap();
        assert_eq!(terse.kernelhints, KernelHints::Terse);
        assert!(terse.kernelhints.enabled());

        assert!(toml::from_str::<Probe>("kernelhints = 2").is_err());
    }

    #[test]
    fn test_bad_regex_is_fatal() {
        let raw = RawConfig {
            blacklist: vec!["([".into()],
            ..Default::default()
        };
        let err = Config::from_raw(raw).unwrap_err();
        assert!(matches!(err, Error::ConfigRegex { key: "blacklist", .. }));
    }

    #[test]
    fn test_overrides_first_match_wins() {
        let raw = RawConfig {
            override_rc: BTreeMap::from([("^dbus".to_string(), false), ("^d".to_string(), true)]),
            ..Default::default()
        };
        let cfg = Config::from_raw(raw).unwrap();
        // BTreeMap iteration is lexicographic: "^d" sorts before "^dbus".
        assert_eq!(Config::apply_overrides(&cfg.override_rc, "dbus"), Some(true));
        assert_eq!(Config::apply_overrides(&cfg.override_rc, "cron"), None);
    }

    #[test]
    fn test_blacklist_matching() {
        let raw = RawConfig {
            blacklist: vec!["^/opt/vendor/".into()],
            blacklist_rc: vec!["^kmod$".into()],
            ..Default::default()
        };
        let cfg = Config::from_raw(raw).unwrap();
        assert!(cfg.exe_blacklisted("/opt/vendor/bin/agent"));
        assert!(!cfg.exe_blacklisted("/usr/sbin/sshd"));
        assert!(cfg.unit_blacklisted("kmod"));
        assert!(!cfg.unit_blacklisted("kmod-extra"));
    }
}
