//! The `update_manifests` task: refresh hosted manifests and record changes.

mod config;
mod outcome;
mod updater;

pub use config::RefreshConfig;
pub use outcome::{RefreshError, SkipReason, UpdateOutcome, UpdateReport};
pub use updater::{ManifestUpdater, RefreshContext};

/// Name the task is registered under for dispatch.
pub const TASK_NAME: &str = "update_manifests";
