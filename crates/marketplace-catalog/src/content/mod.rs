use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::CatalogError;
use crate::model::AppId;

mod fs;

pub use fs::FsContentStore;

/// Byte storage for manifest content, keyed by app and a per-app key.
pub trait ContentStore: Send + Sync {
    fn write(&self, app: AppId, key: &str, payload: &[u8]) -> Result<(), CatalogError>;
    fn read(&self, app: AppId, key: &str) -> Result<Option<Vec<u8>>, CatalogError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    inner: Arc<Mutex<HashMap<(AppId, String), Vec<u8>>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContentStore for MemoryContentStore {
    fn write(&self, app: AppId, key: &str, payload: &[u8]) -> Result<(), CatalogError> {
        let mut guard = self.inner.lock().map_err(|_| CatalogError::Poisoned)?;
        guard.insert((app, key.to_string()), payload.to_vec());
        Ok(())
    }

    fn read(&self, app: AppId, key: &str) -> Result<Option<Vec<u8>>, CatalogError> {
        let guard = self.inner.lock().map_err(|_| CatalogError::Poisoned)?;
        Ok(guard.get(&(app, key.to_string())).cloned())
    }
}
