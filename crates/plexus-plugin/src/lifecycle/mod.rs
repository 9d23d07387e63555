//! Plugin lifecycle: state transitions and sweep reports.

pub mod manager;
pub mod report;

pub use manager::LifecycleManager;
pub use report::{FailedPlugin, LifecycleReport, SkippedPlugin};
