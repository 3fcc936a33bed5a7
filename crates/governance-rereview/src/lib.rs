//! Re-review queue: apps awaiting manual review after an automated change.
//!
//! An app holds at most one outstanding entry. Flagging an app that is already
//! queued still records the triggering event in the activity log.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use governance_audit::{ActivityAction, ActivityLog, AuditError, NewActivity};
use marketplace_catalog::{AppId, UserId, VersionId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RereviewEntry {
    pub app: AppId,
    pub created: DateTime<Utc>,
}

/// Event that triggered a flag.
#[derive(Debug, Clone)]
pub struct RereviewTrigger {
    pub action: ActivityAction,
    pub version: Option<VersionId>,
    pub user: UserId,
    pub message: Option<String>,
}

#[derive(Debug, Error)]
pub enum RereviewError {
    #[error("re-review queue lock poisoned")]
    Poisoned,
    #[error("activity log: {0}")]
    Audit(#[from] AuditError),
}

#[derive(Debug, Clone)]
pub struct RereviewQueue {
    entries: Arc<Mutex<BTreeMap<AppId, RereviewEntry>>>,
    log: ActivityLog,
}

impl RereviewQueue {
    pub fn new(log: ActivityLog) -> Self {
        Self::from_entries(Vec::new(), log)
    }

    pub fn from_entries(entries: Vec<RereviewEntry>, log: ActivityLog) -> Self {
        Self {
            entries: Arc::new(Mutex::new(
                entries.into_iter().map(|entry| (entry.app, entry)).collect(),
            )),
            log,
        }
    }

    /// Queue `app` unless already queued and log the trigger. Returns whether a
    /// new entry was created.
    pub fn flag(&self, app: AppId, trigger: RereviewTrigger) -> Result<bool, RereviewError> {
        let created = {
            let mut guard = self.lock()?;
            if guard.contains_key(&app) {
                false
            } else {
                guard.insert(
                    app,
                    RereviewEntry {
                        app,
                        created: Utc::now(),
                    },
                );
                true
            }
        };
        if created {
            info!(app = %app, "app queued for re-review");
        } else {
            debug!(app = %app, "app already queued for re-review");
        }

        let details = match trigger.message {
            Some(message) => json!({ "comments": message }),
            None => Value::Null,
        };
        self.log.record(NewActivity {
            action: trigger.action,
            app,
            version: trigger.version,
            user: trigger.user,
            details,
        })?;
        Ok(created)
    }

    /// End the review cycle for `app`.
    pub fn clear(&self, app: AppId, user: UserId) -> Result<bool, RereviewError> {
        let removed = self.lock()?.remove(&app).is_some();
        if removed {
            self.log.record(NewActivity {
                action: ActivityAction::RereviewCleared,
                app,
                version: None,
                user,
                details: Value::Null,
            })?;
        }
        Ok(removed)
    }

    pub fn contains(&self, app: AppId) -> bool {
        self.lock().map(|guard| guard.contains_key(&app)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Vec<RereviewEntry> {
        self.lock()
            .map(|guard| guard.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.log
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<AppId, RereviewEntry>>, RereviewError> {
        self.entries.lock().map_err(|_| RereviewError::Poisoned)
    }
}
