use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CatalogError;
use crate::model::{
    AppId, FileId, NewApp, NewFile, Version, VersionFile, VersionId, Webapp,
};

/// Persistence surface for apps and their versions.
pub trait Catalog: Send + Sync {
    fn insert_app(&self, app: NewApp) -> Result<Webapp, CatalogError>;
    fn get_app(&self, id: AppId) -> Result<Option<Webapp>, CatalogError>;
    fn list_apps(&self) -> Result<Vec<Webapp>, CatalogError>;
    /// Persist mutable app fields (status, name, flags).
    fn update_app(&self, app: &Webapp) -> Result<(), CatalogError>;
    fn create_version(
        &self,
        app: AppId,
        version: &str,
        created: DateTime<Utc>,
    ) -> Result<Version, CatalogError>;
    fn create_file(&self, version: VersionId, file: NewFile) -> Result<VersionFile, CatalogError>;
    /// Versions of an app, oldest first.
    fn versions(&self, app: AppId) -> Result<Vec<Version>, CatalogError>;
    fn files(&self, version: VersionId) -> Result<Vec<VersionFile>, CatalogError>;
    fn set_current_version(&self, app: AppId, version: VersionId) -> Result<(), CatalogError>;

    fn current_version(&self, app: AppId) -> Result<Option<Version>, CatalogError> {
        let Some(record) = self.get_app(app)? else {
            return Err(CatalogError::AppNotFound(app));
        };
        let Some(current) = record.current_version else {
            return Ok(None);
        };
        Ok(self
            .versions(app)?
            .into_iter()
            .find(|version| version.id == current))
    }

    /// Newest file of the current version.
    fn latest_file(&self, app: AppId) -> Result<Option<VersionFile>, CatalogError> {
        let Some(version) = self.current_version(app)? else {
            return Ok(None);
        };
        Ok(self
            .files(version.id)?
            .into_iter()
            .max_by_key(|file| file.id))
    }
}

/// Serializable image of a [`MemoryCatalog`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub apps: Vec<Webapp>,
    pub versions: Vec<Version>,
    pub files: Vec<VersionFile>,
}

#[derive(Debug, Default)]
struct CatalogState {
    apps: BTreeMap<AppId, Webapp>,
    versions: BTreeMap<VersionId, Version>,
    files: BTreeMap<FileId, VersionFile>,
    next_app: u64,
    next_version: u64,
    next_file: u64,
}

impl CatalogState {
    fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let next_app = snapshot.apps.iter().map(|a| a.id.0).max().unwrap_or(0);
        let next_version = snapshot.versions.iter().map(|v| v.id.0).max().unwrap_or(0);
        let next_file = snapshot.files.iter().map(|f| f.id.0).max().unwrap_or(0);
        Self {
            apps: snapshot.apps.into_iter().map(|a| (a.id, a)).collect(),
            versions: snapshot.versions.into_iter().map(|v| (v.id, v)).collect(),
            files: snapshot.files.into_iter().map(|f| (f.id, f)).collect(),
            next_app,
            next_version,
            next_file,
        }
    }
}

/// Mutex-guarded in-process catalog.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    inner: Arc<Mutex<CatalogState>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CatalogState::from_snapshot(snapshot))),
        }
    }

    pub fn snapshot(&self) -> Result<CatalogSnapshot, CatalogError> {
        let guard = self.lock()?;
        Ok(CatalogSnapshot {
            apps: guard.apps.values().cloned().collect(),
            versions: guard.versions.values().cloned().collect(),
            files: guard.files.values().cloned().collect(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, CatalogState>, CatalogError> {
        self.inner.lock().map_err(|_| CatalogError::Poisoned)
    }
}

impl Catalog for MemoryCatalog {
    fn insert_app(&self, app: NewApp) -> Result<Webapp, CatalogError> {
        let mut guard = self.lock()?;
        guard.next_app += 1;
        let now = Utc::now();
        let record = Webapp {
            id: AppId(guard.next_app),
            kind: app.kind,
            status: app.status,
            name: app.name,
            manifest_url: app.manifest_url,
            is_packaged: app.is_packaged,
            disabled_by_user: app.disabled_by_user,
            current_version: None,
            created: now,
            modified: now,
        };
        guard.apps.insert(record.id, record.clone());
        debug!(app = %record.id, "app inserted");
        Ok(record)
    }

    fn get_app(&self, id: AppId) -> Result<Option<Webapp>, CatalogError> {
        Ok(self.lock()?.apps.get(&id).cloned())
    }

    fn list_apps(&self) -> Result<Vec<Webapp>, CatalogError> {
        Ok(self.lock()?.apps.values().cloned().collect())
    }

    fn update_app(&self, app: &Webapp) -> Result<(), CatalogError> {
        let mut guard = self.lock()?;
        let record = guard
            .apps
            .get_mut(&app.id)
            .ok_or(CatalogError::AppNotFound(app.id))?;
        // Version pointer only moves through set_current_version.
        let current_version = record.current_version;
        *record = app.clone();
        record.current_version = current_version;
        record.modified = Utc::now();
        Ok(())
    }

    fn create_version(
        &self,
        app: AppId,
        version: &str,
        created: DateTime<Utc>,
    ) -> Result<Version, CatalogError> {
        let mut guard = self.lock()?;
        if !guard.apps.contains_key(&app) {
            return Err(CatalogError::AppNotFound(app));
        }
        guard.next_version += 1;
        let record = Version {
            id: VersionId(guard.next_version),
            app,
            version: version.to_string(),
            created,
            modified: created,
        };
        guard.versions.insert(record.id, record.clone());
        debug!(app = %app, version = %record.id, "version created");
        Ok(record)
    }

    fn create_file(&self, version: VersionId, file: NewFile) -> Result<VersionFile, CatalogError> {
        let mut guard = self.lock()?;
        if !guard.versions.contains_key(&version) {
            return Err(CatalogError::VersionNotFound(version));
        }
        guard.next_file += 1;
        let record = VersionFile {
            id: FileId(guard.next_file),
            version,
            platform: file.platform,
            filename: file.filename,
            hash: file.hash,
            status: file.status,
            content_key: file.content_key,
            created: Utc::now(),
        };
        guard.files.insert(record.id, record.clone());
        Ok(record)
    }

    fn versions(&self, app: AppId) -> Result<Vec<Version>, CatalogError> {
        Ok(self
            .lock()?
            .versions
            .values()
            .filter(|version| version.app == app)
            .cloned()
            .collect())
    }

    fn files(&self, version: VersionId) -> Result<Vec<VersionFile>, CatalogError> {
        Ok(self
            .lock()?
            .files
            .values()
            .filter(|file| file.version == version)
            .cloned()
            .collect())
    }

    fn set_current_version(&self, app: AppId, version: VersionId) -> Result<(), CatalogError> {
        let mut guard = self.lock()?;
        let owner = guard
            .versions
            .get(&version)
            .map(|record| record.app)
            .ok_or(CatalogError::VersionNotFound(version))?;
        if owner != app {
            return Err(CatalogError::ForeignVersion { app, version });
        }
        let record = guard
            .apps
            .get_mut(&app)
            .ok_or(CatalogError::AppNotFound(app))?;
        record.current_version = Some(version);
        record.modified = Utc::now();
        Ok(())
    }
}
