//! needrestart core library.
//!
//! The pipeline: snapshot the process table, classify each process as fresh
//! or stale (deleted-exe markers, memory-map inode/device comparison,
//! interpreter script mtimes), reduce the stale set to restartable units via
//! parent chains and cgroup membership, and compare the booted kernel
//! against the newest installed image.

pub mod collect;
pub mod exit_codes;
pub mod interp;
pub mod kernel;
pub mod logging;
pub mod notify;
pub mod output;
pub mod reduce;
pub mod resolver;
pub mod restart;
