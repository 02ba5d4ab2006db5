//! Port implementations for external systems.

pub mod generation;
pub mod http;
pub mod memory;
pub mod sqlite;
pub mod validation;
