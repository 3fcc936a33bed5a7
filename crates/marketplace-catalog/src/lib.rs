//! Marketplace catalog: apps, versions, files and the stored manifest content.

pub mod catalog;
pub mod content;
pub mod error;
pub mod hash;
pub mod model;

pub use catalog::{Catalog, CatalogSnapshot, MemoryCatalog};
pub use content::{ContentStore, FsContentStore, MemoryContentStore};
pub use error::CatalogError;
pub use hash::ContentHash;
pub use model::{
    AppId, AppKind, AppStatus, FileId, FileStatus, NewApp, NewFile, Platform, UserId, Version,
    VersionFile, VersionId, Webapp,
};
