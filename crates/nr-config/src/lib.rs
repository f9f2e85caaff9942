//! needrestart configuration loading and validation.
//!
//! The configuration file is declarative TOML: scalar keys, regex lists and
//! regex→bool tables, nothing executable. Parsing is strict: unknown keys
//! are rejected, regexes must compile, enum-valued keys accept exactly the
//! documented spellings. The result is a single immutable [`Config`] value
//! assembled once after CLI and file parsing and passed by reference to
//! every component.

pub mod load;
pub mod model;

pub use load::{load_config, DEFAULT_CONFIG_PATH};
pub use model::{Config, KernelHints, OverrideRule};
