//! Error types for needrestart.
//!
//! Only initialization problems are fatal: an unreadable configuration file,
//! an invalid mode flag, a missing hook directory. Everything encountered
//! while walking processes is transient and is skipped rather than
//! propagated, so per-PID code paths return `Option` instead of `Result`.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for needrestart operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for needrestart.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("invalid regular expression {pattern:?} in {key}: {message}")]
    ConfigRegex {
        key: &'static str,
        pattern: String,
        message: String,
    },

    #[error("hook directory {0} is not a directory")]
    HookDirMissing(PathBuf),

    #[error("process table scan failed: {0}")]
    Snapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error must abort the run (exit code 1).
    ///
    /// All variants are fatal at present; transient conditions never reach
    /// this type. Kept as a method so the driver reads intent, not taxonomy.
    pub fn is_fatal(&self) -> bool {
        true
    }
}
