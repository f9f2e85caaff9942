//! Shared types and errors for needrestart.
//!
//! This crate provides foundational types used across the workspace:
//! - The common error type and `Result` alias
//! - CLI mode enums shared between the config layer and the driver
//! - Natural-order sorting for hook and notify directories

pub mod error;
pub mod modes;
pub mod natsort;

pub use error::{Error, Result};
pub use modes::{DetailMode, RestartMode, Verbosity};
pub use natsort::{natural_cmp, natural_sorted};
