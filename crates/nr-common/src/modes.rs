//! Run-mode enums shared by the CLI surface and the configuration file.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How detected restart units are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum RestartMode {
    /// List affected units only, never touch them.
    #[value(name = "l")]
    #[serde(rename = "l")]
    ListOnly,

    /// Ask per unit before restarting.
    #[default]
    #[value(name = "i")]
    #[serde(rename = "i")]
    Interactive,

    /// Restart every detected unit without asking.
    #[value(name = "a")]
    #[serde(rename = "a")]
    Automatic,
}

/// Listing detail level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
pub enum DetailMode {
    /// Summary counts with hints.
    #[value(name = "e")]
    #[serde(rename = "e")]
    Easy,

    /// Full per-unit listing.
    #[default]
    #[value(name = "a")]
    #[serde(rename = "a")]
    Advanced,
}

/// Message verbosity: quiet, normal, verbose.
///
/// `-v` and `-q` override each other; the last resolved value wins over the
/// configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    pub fn is_verbose(self) -> bool {
        self == Verbosity::Verbose
    }
}

impl From<Verbosity> for u8 {
    fn from(v: Verbosity) -> u8 {
        match v {
            Verbosity::Quiet => 0,
            Verbosity::Normal => 1,
            Verbosity::Verbose => 2,
        }
    }
}

impl TryFrom<u8> for Verbosity {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, String> {
        match v {
            0 => Ok(Verbosity::Quiet),
            1 => Ok(Verbosity::Normal),
            2 => Ok(Verbosity::Verbose),
            other => Err(format!("verbosity must be 0, 1 or 2, got {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_mode_default() {
        assert_eq!(RestartMode::default(), RestartMode::Interactive);
    }

    #[test]
    fn test_verbosity_roundtrip() {
        for v in [Verbosity::Quiet, Verbosity::Normal, Verbosity::Verbose] {
            let n: u8 = v.into();
            assert_eq!(Verbosity::try_from(n).unwrap(), v);
        }
        assert!(Verbosity::try_from(3).is_err());
    }

    #[test]
    fn test_verbosity_ordering() {
        assert!(Verbosity::Quiet < Verbosity::Normal);
        assert!(Verbosity::Normal < Verbosity::Verbose);
    }
}
