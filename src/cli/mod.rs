//! Command-line front end.

pub mod commands;
pub mod context;
pub mod output;
pub mod types;

pub use context::{load_config, CliContext};
pub use output::handle_error;
pub use types::{Cli, Commands};
