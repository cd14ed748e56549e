//! ngm-core — shared types and configuration for ngm.
//!
//! Holds the pieces every other crate agrees on: the identity of a
//! profiling target, the `ngm.toml` configuration model, and the
//! [`ConfigHandle`] through which running components observe live
//! configuration changes.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    ConfigHandle, ContinuousProfilingConfig, NgmConfig, ProfilingPathConfig, TargetConfig,
};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
