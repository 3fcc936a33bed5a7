use thiserror::Error;

use crate::model::{AppId, VersionId};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("app {0} not found")]
    AppNotFound(AppId),
    #[error("version {0} not found")]
    VersionNotFound(VersionId),
    #[error("version {version} does not belong to app {app}")]
    ForeignVersion { app: AppId, version: VersionId },
    #[error("I/O error: {0}")]
    Io(String),
    #[error("catalog lock poisoned")]
    Poisoned,
}
