use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use tracing::debug;

use super::ContentStore;
use crate::error::CatalogError;
use crate::model::AppId;

/// Filesystem-backed content store: one directory per app under `root`.
///
/// Keys may contain `/`; they are escaped into a single file name.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File holding the content stored for `app` under `key`.
    pub fn path_for(&self, app: AppId, key: &str) -> PathBuf {
        self.root.join(app.to_string()).join(escape_key(key))
    }
}

fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'-' | b'_' | b'.' => {
                escaped.push(byte as char)
            }
            _ => escaped.push_str(&format!("%{byte:02X}")),
        }
    }
    escaped
}

fn io_error(err: std::io::Error) -> CatalogError {
    CatalogError::Io(err.to_string())
}

impl ContentStore for FsContentStore {
    fn write(&self, app: AppId, key: &str, payload: &[u8]) -> Result<(), CatalogError> {
        let target = self.path_for(app, key);
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir).map_err(io_error)?;
        }
        // Readers never see a half-written manifest.
        let mut staging = target.clone().into_os_string();
        staging.push(".partial");
        let staging = PathBuf::from(staging);
        let mut file = File::create(&staging).map_err(io_error)?;
        file.write_all(payload).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;
        drop(file);
        fs::rename(&staging, &target).map_err(io_error)?;
        debug!(app = %app, key, bytes = payload.len(), "manifest content stored");
        Ok(())
    }

    fn read(&self, app: AppId, key: &str) -> Result<Option<Vec<u8>>, CatalogError> {
        match fs::read(self.path_for(app, key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(err)),
        }
    }
}
