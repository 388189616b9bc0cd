//! Forward Networks REST API client
//!
//! `Client` owns the HTTP transport and retry policy; the entity modules
//! expose typed operations through accessors such as `client.snapshots()`.

pub mod client;
pub mod error;
pub mod intent_checks;
pub mod nqe;
pub mod path_analysis;
pub mod snapshots;
pub mod version;

pub use client::{Client, ClientConfig, DEFAULT_USER_AGENT};
pub use error::ApiError;

#[cfg(test)]
pub(crate) mod test_helpers;
