//! Process bootstrap for the dlock binary

pub mod logging;

pub use logging::{LoggingConfig, LoggingGuard, init_logging};
