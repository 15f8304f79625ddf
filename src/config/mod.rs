//! # Configuration
//!
//! Environment-driven controller settings.

mod controller;
mod watch_scope;

pub use controller::ControllerConfig;
pub use watch_scope::{ConfigError, WatchScope};
