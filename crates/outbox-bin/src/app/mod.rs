//! Application wiring and command handlers.

mod commands;
mod lifecycle;
mod probe;
mod state;

pub use commands::{enqueue, list, list_failed, purge, retry, show_stats};
pub use lifecycle::{flush, run};
