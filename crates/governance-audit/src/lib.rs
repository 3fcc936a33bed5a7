//! Activity log: the audit trail of actions taken against apps.

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use marketplace_catalog::{AppId, UserId, VersionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    ManifestUpdated,
    RereviewManifestChange,
    RereviewCleared,
}

impl ActivityAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ManifestUpdated => "manifest_updated",
            Self::RereviewManifestChange => "rereview_manifest_change",
            Self::RereviewCleared => "rereview_cleared",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub action: ActivityAction,
    pub app: AppId,
    pub version: Option<VersionId>,
    pub user: UserId,
    pub details: Value,
    pub created: DateTime<Utc>,
}

impl ActivityEntry {
    /// Details payload rendered as text, used for searching.
    pub fn details_text(&self) -> String {
        match &self.details {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    /// Free-form reviewer comment carried in the details, if any.
    pub fn comments(&self) -> Option<&str> {
        self.details.get("comments").and_then(Value::as_str)
    }
}

/// Fields supplied when recording an action.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub action: ActivityAction,
    pub app: AppId,
    pub version: Option<VersionId>,
    pub user: UserId,
    pub details: Value,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("activity log lock poisoned")]
    Poisoned,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed activity entry on line {line}: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },
}

/// Append-only, shareable activity log.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    inner: Arc<Mutex<Vec<ActivityEntry>>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<ActivityEntry>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(entries)),
        }
    }

    pub fn record(&self, activity: NewActivity) -> Result<ActivityEntry, AuditError> {
        let entry = ActivityEntry {
            id: Uuid::new_v4(),
            action: activity.action,
            app: activity.app,
            version: activity.version,
            user: activity.user,
            details: activity.details,
            created: Utc::now(),
        };
        self.lock()?.push(entry.clone());
        info!(app = %entry.app, action = entry.action.as_str(), "activity recorded");
        Ok(entry)
    }

    pub fn for_app(&self, app: AppId) -> Vec<ActivityEntry> {
        self.lock()
            .map(|guard| guard.iter().filter(|e| e.app == app).cloned().collect())
            .unwrap_or_default()
    }

    pub fn all(&self) -> Vec<ActivityEntry> {
        self.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every entry as one JSON document per line.
    pub fn export_jsonl<W: Write>(&self, mut writer: W) -> Result<(), AuditError> {
        for entry in self.lock()?.iter() {
            serde_json::to_writer(&mut writer, entry).map_err(std::io::Error::from)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn import_jsonl<R: BufRead>(reader: R) -> Result<Self, AuditError> {
        let mut entries = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(&line).map_err(|source| AuditError::Malformed {
                line: idx + 1,
                source,
            })?;
            entries.push(entry);
        }
        Ok(Self::from_entries(entries))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<ActivityEntry>>, AuditError> {
        self.inner.lock().map_err(|_| AuditError::Poisoned)
    }
}
