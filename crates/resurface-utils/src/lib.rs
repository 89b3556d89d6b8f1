//! # Resurface Utilities
//!
//! Shared utilities and logging bootstrap for the Resurface workspace.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel};
pub use tracing::{debug, error, info, trace, warn};
