//! Domain layer for the agent runtime
//!
//! Value types, port traits for external collaborators and the error taxonomy.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult, StreamError, TransportError};
