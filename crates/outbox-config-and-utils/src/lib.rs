//! Configuration, filesystem paths, and logging setup for the field outbox.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, DEFAULT_ENDPOINT, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
