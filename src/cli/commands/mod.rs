//! Subcommand definitions and handlers.

pub mod agent;
pub mod approval;
pub mod config;
pub mod invoke;
pub mod metrics;
