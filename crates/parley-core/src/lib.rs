//! Parley core crate - shared message types, error type, and configuration.

pub mod config;
pub mod error;
pub mod types;

pub use config::ParleyConfig;
pub use error::{ParleyError, Result};
pub use types::*;
