//! Core type definitions used across the Plexus workspace.

pub mod id;
pub mod state;

pub use id::*;
pub use state::PluginState;
