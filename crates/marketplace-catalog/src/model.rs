//! Catalog records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

macro_rules! record_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(AppId);
record_id!(VersionId);
record_id!(FileId);
record_id!(UserId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppKind {
    Webapp,
    Extension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
    /// Incomplete listing, never reviewed.
    Null,
    Pending,
    Public,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Public,
    Disabled,
}

impl FileStatus {
    /// Status a freshly created file inherits from its app.
    pub fn for_app(status: AppStatus) -> Self {
        match status {
            AppStatus::Public => Self::Public,
            AppStatus::Disabled => Self::Disabled,
            AppStatus::Null | AppStatus::Pending => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    All,
    Desktop,
    Android,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webapp {
    pub id: AppId,
    pub kind: AppKind,
    pub status: AppStatus,
    pub name: String,
    pub manifest_url: String,
    pub is_packaged: bool,
    pub disabled_by_user: bool,
    pub current_version: Option<VersionId>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// Fields supplied when listing a new app.
#[derive(Debug, Clone)]
pub struct NewApp {
    pub kind: AppKind,
    pub status: AppStatus,
    pub name: String,
    pub manifest_url: String,
    pub is_packaged: bool,
    pub disabled_by_user: bool,
}

impl NewApp {
    pub fn hosted(name: impl Into<String>, manifest_url: impl Into<String>) -> Self {
        Self {
            kind: AppKind::Webapp,
            status: AppStatus::Public,
            name: name.into(),
            manifest_url: manifest_url.into(),
            is_packaged: false,
            disabled_by_user: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub app: AppId,
    pub version: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionFile {
    pub id: FileId,
    pub version: VersionId,
    pub platform: Platform,
    pub filename: String,
    pub hash: ContentHash,
    pub status: FileStatus,
    /// Content store key holding the manifest bytes.
    pub content_key: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFile {
    pub platform: Platform,
    pub filename: String,
    pub hash: ContentHash,
    pub status: FileStatus,
    pub content_key: String,
}
