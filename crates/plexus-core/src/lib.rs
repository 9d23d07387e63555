//! # plexus-core
//!
//! Core crate for the Plexus plugin runtime. Contains the unified error
//! system, runtime configuration schemas, typed identifiers, and the
//! structured lifecycle events the runtime publishes.
//!
//! This crate has **no** internal dependencies on other Plexus crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
