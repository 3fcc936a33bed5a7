//! Task dispatch over catalog apps: select targets, chunk ids, run the task.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use marketplace_catalog::{AppId, AppKind, AppStatus, Catalog, CatalogError, Webapp};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Counters reported by a task run over one chunk of apps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub processed: usize,
    pub changed: usize,
    pub flagged: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl TaskSummary {
    pub fn merge(&mut self, other: TaskSummary) {
        self.processed += other.processed;
        self.changed += other.changed;
        self.flagged += other.flagged;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// Background task invoked with a chunk of app ids.
#[async_trait]
pub trait AppTask: Send + Sync {
    async fn run(&self, ids: Vec<AppId>) -> anyhow::Result<TaskSummary>;
}

/// Which apps a task applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppFilter {
    pub kinds: Vec<AppKind>,
    pub statuses: Vec<AppStatus>,
    pub include_packaged: bool,
    pub include_disabled_by_user: bool,
}

impl AppFilter {
    /// Public, hosted web apps their developers have not disabled.
    pub fn hosted_public_webapps() -> Self {
        Self {
            kinds: vec![AppKind::Webapp],
            statuses: vec![AppStatus::Public],
            include_packaged: false,
            include_disabled_by_user: false,
        }
    }

    pub fn matches(&self, app: &Webapp) -> bool {
        self.kinds.contains(&app.kind)
            && self.statuses.contains(&app.status)
            && (self.include_packaged || !app.is_packaged)
            && (self.include_disabled_by_user || !app.disabled_by_user)
    }
}

#[derive(Clone)]
struct RegisteredTask {
    filter: AppFilter,
    task: Arc<dyn AppTask>,
}

#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, RegisteredTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        filter: AppFilter,
        task: Arc<dyn AppTask>,
    ) -> &mut Self {
        self.tasks
            .insert(name.into(), RegisteredTask { filter, task });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub chunk_size: usize,
    /// Chunks allowed to run at the same time.
    pub concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub task: String,
    pub selected: usize,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub totals: TaskSummary,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown task `{0}`")]
    UnknownTask(String),
    #[error("dispatcher misconfigured: {0}")]
    Misconfigured(String),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

pub struct Dispatcher {
    catalog: Arc<dyn Catalog>,
    registry: TaskRegistry,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(catalog: Arc<dyn Catalog>, registry: TaskRegistry, config: DispatchConfig) -> Self {
        Self {
            catalog,
            registry,
            config,
        }
    }

    /// Ids of the apps `task` would be run against.
    pub fn select(&self, task: &str) -> Result<Vec<AppId>, DispatchError> {
        let entry = self
            .registry
            .tasks
            .get(task)
            .ok_or_else(|| DispatchError::UnknownTask(task.to_string()))?;
        Ok(self
            .catalog
            .list_apps()?
            .into_iter()
            .filter(|app| entry.filter.matches(app))
            .map(|app| app.id)
            .collect())
    }

    pub async fn run(&self, task: &str) -> Result<DispatchSummary, DispatchError> {
        if self.config.chunk_size == 0 {
            return Err(DispatchError::Misconfigured(
                "chunk_size cannot be zero".into(),
            ));
        }
        if self.config.concurrency == 0 {
            return Err(DispatchError::Misconfigured(
                "concurrency cannot be zero".into(),
            ));
        }
        let ids = self.select(task)?;
        let mut summary = DispatchSummary {
            task: task.to_string(),
            selected: ids.len(),
            ..Default::default()
        };
        if ids.is_empty() {
            info!(task, "no apps selected");
            return Ok(summary);
        }

        let runner = Arc::clone(&self.registry.tasks[task].task);
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let mut running = JoinSet::new();
        for chunk in ids.chunks(self.config.chunk_size) {
            let chunk = chunk.to_vec();
            let runner = Arc::clone(&runner);
            let permits = Arc::clone(&permits);
            summary.chunks += 1;
            running.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| anyhow::anyhow!(e))?;
                runner.run(chunk).await
            });
        }

        while let Some(joined) = running.join_next().await {
            match joined {
                Ok(Ok(chunk_summary)) => summary.totals.merge(chunk_summary),
                Ok(Err(err)) => {
                    warn!(task, error = %err, "chunk failed");
                    summary.failed_chunks += 1;
                }
                Err(err) => {
                    warn!(task, error = %err, "chunk did not complete");
                    summary.failed_chunks += 1;
                }
            }
        }
        info!(
            task,
            selected = summary.selected,
            chunks = summary.chunks,
            failed_chunks = summary.failed_chunks,
            "dispatch finished"
        );
        Ok(summary)
    }
}

/// In-memory task that records the chunks it receives.
#[derive(Debug, Default)]
pub struct RecordingTask {
    calls: Mutex<Vec<Vec<AppId>>>,
    fail: bool,
}

impl RecordingTask {
    /// A task whose every run fails.
    pub fn failing() -> Self {
        Self {
            calls: Mutex::default(),
            fail: true,
        }
    }

    pub async fn calls(&self) -> Vec<Vec<AppId>> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl AppTask for RecordingTask {
    async fn run(&self, ids: Vec<AppId>) -> anyhow::Result<TaskSummary> {
        let processed = ids.len();
        self.calls.lock().await.push(ids);
        if self.fail {
            anyhow::bail!("scripted failure");
        }
        Ok(TaskSummary {
            processed,
            ..Default::default()
        })
    }
}
