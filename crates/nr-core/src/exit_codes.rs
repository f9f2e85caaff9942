//! Exit codes for the needrestart CLI.
//!
//! Non-plugin runs use plain success/failure: 0 on success, 1 on a usage or
//! fatal configuration error. Plugin mode (`-p`) speaks the Nagios plugin
//! protocol instead: the exit code is the worst status across the enabled
//! check categories.

/// Nagios plugin status.
///
/// A stable contract for monitoring integrations; the numeric values are
/// fixed by the plugin protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum NagiosStatus {
    Ok = 0,
    Warning = 1,
    Critical = 2,
    Unknown = 3,
}

impl NagiosStatus {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Short label used in the status line.
    pub fn label(self) -> &'static str {
        match self {
            NagiosStatus::Ok => "OK",
            NagiosStatus::Warning => "WARN",
            NagiosStatus::Critical => "CRIT",
            NagiosStatus::Unknown => "UNKN",
        }
    }

    /// Combine category results: the worst one wins.
    pub fn combine(self, other: NagiosStatus) -> NagiosStatus {
        self.max(other)
    }
}

impl std::fmt::Display for NagiosStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_match_protocol() {
        assert_eq!(NagiosStatus::Ok.as_i32(), 0);
        assert_eq!(NagiosStatus::Warning.as_i32(), 1);
        assert_eq!(NagiosStatus::Critical.as_i32(), 2);
        assert_eq!(NagiosStatus::Unknown.as_i32(), 3);
    }

    #[test]
    fn test_combine_takes_worst() {
        assert_eq!(
            NagiosStatus::Ok.combine(NagiosStatus::Warning),
            NagiosStatus::Warning
        );
        assert_eq!(
            NagiosStatus::Critical.combine(NagiosStatus::Warning),
            NagiosStatus::Critical
        );
        assert_eq!(
            NagiosStatus::Unknown.combine(NagiosStatus::Critical),
            NagiosStatus::Unknown
        );
    }

    #[test]
    fn test_labels() {
        assert_eq!(NagiosStatus::Ok.label(), "OK");
        assert_eq!(NagiosStatus::Unknown.label(), "UNKN");
    }
}
