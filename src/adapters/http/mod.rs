//! HTTP transport adapter.

pub mod reqwest_client;

pub use reqwest_client::{transport_error, ReqwestHttpClient};
