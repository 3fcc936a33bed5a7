use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use governance_audit::{ActivityAction, ActivityLog, NewActivity};
use governance_rereview::{RereviewQueue, RereviewTrigger};
use manifest_fetch::ManifestFetcher;
use manifest_validation::{manifest_name, ManifestValidator, ValidationReport};
use marketplace_catalog::{
    AppId, Catalog, ContentHash, ContentStore, FileStatus, NewFile, Platform, VersionFile, Webapp,
};
use runtime_dispatch::{AppTask, TaskSummary};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::RefreshConfig;
use crate::outcome::{RefreshError, SkipReason, UpdateOutcome, UpdateReport};

/// Stores the task reads from and writes to.
///
/// `rereview` must record into the same log as `activity`.
#[derive(Clone)]
pub struct RefreshContext {
    pub catalog: Arc<dyn Catalog>,
    pub content: Arc<dyn ContentStore>,
    pub activity: ActivityLog,
    pub rereview: RereviewQueue,
}

pub struct ManifestUpdater {
    config: RefreshConfig,
    ctx: RefreshContext,
    fetcher: Arc<dyn ManifestFetcher>,
    validator: ManifestValidator,
}

impl ManifestUpdater {
    pub fn new(
        config: RefreshConfig,
        ctx: RefreshContext,
        fetcher: Arc<dyn ManifestFetcher>,
        validator: ManifestValidator,
    ) -> Self {
        Self {
            config,
            ctx,
            fetcher,
            validator,
        }
    }

    /// Refresh every app in `ids`, one after another.
    pub async fn update_manifests(&self, ids: &[AppId]) -> UpdateReport {
        let mut report = UpdateReport::default();
        for &id in ids {
            report.outcomes.push((id, self.update_manifest(id).await));
        }
        report
    }

    pub async fn update_manifest(&self, id: AppId) -> UpdateOutcome {
        match self.refresh(id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(app = %id, error = %err, "manifest refresh aborted");
                UpdateOutcome::Failed(err)
            }
        }
    }

    async fn refresh(&self, id: AppId) -> Result<UpdateOutcome, RefreshError> {
        let Some(app) = self.ctx.catalog.get_app(id)? else {
            warn!(app = %id, "app not found");
            return Ok(UpdateOutcome::Skipped(SkipReason::NotFound));
        };
        if app.is_packaged {
            debug!(app = %id, "packaged app has no hosted manifest");
            return Ok(UpdateOutcome::Skipped(SkipReason::Packaged));
        }
        let Some(file) = self.ctx.catalog.latest_file(id)? else {
            warn!(app = %id, "app has no manifest on file");
            return Ok(UpdateOutcome::Skipped(SkipReason::NoFile));
        };

        let fetched = match self.fetcher.fetch(&app.manifest_url).await {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(
                    app = %id,
                    url = %app.manifest_url,
                    error = %err,
                    "failed to fetch manifest"
                );
                return Ok(UpdateOutcome::FetchFailed(err));
            }
        };

        let new_hash = ContentHash::of(&fetched.body);
        if new_hash == file.hash {
            debug!(app = %id, hash = %new_hash, "manifest unchanged");
            return Ok(UpdateOutcome::Unchanged);
        }

        let validated = match self
            .validator
            .validate(&fetched.body, fetched.content_type.as_deref())
        {
            Ok(validated) => validated,
            Err(report) => return self.reject(&app, report),
        };
        for warning in &validated.warnings {
            debug!(app = %id, warning = %warning, "manifest warning");
        }
        let manifest = validated.manifest;
        let previous_name = self.previous_name(&app, &file)?;

        let version_string = manifest
            .version
            .clone()
            .unwrap_or_else(|| self.config.default_version.clone());
        let content_key = format!("{}-{}", new_hash.digest(), self.config.manifest_filename);
        self.ctx.content.write(id, &content_key, &fetched.body)?;

        let version = self
            .ctx
            .catalog
            .create_version(id, &version_string, Utc::now())?;
        let new_file = self.ctx.catalog.create_file(
            version.id,
            NewFile {
                platform: Platform::All,
                filename: self.config.manifest_filename.clone(),
                hash: new_hash.clone(),
                status: FileStatus::for_app(app.status),
                content_key,
            },
        )?;
        self.ctx.catalog.set_current_version(id, version.id)?;
        self.ctx.activity.record(NewActivity {
            action: ActivityAction::ManifestUpdated,
            app: id,
            version: Some(version.id),
            user: self.config.task_user_id,
            details: json!({
                "version": version_string,
                "hash": new_hash,
                "previous_hash": file.hash,
            }),
        })?;
        info!(app = %id, version = %version.id, hash = %new_hash, "manifest updated");

        let name_changed = manifest.name != previous_name;
        if name_changed {
            let message = format!(
                "Manifest name changed from \"{previous_name}\" to \"{}\".",
                manifest.name
            );
            self.ctx.rereview.flag(
                id,
                RereviewTrigger {
                    action: ActivityAction::RereviewManifestChange,
                    version: Some(version.id),
                    user: self.config.task_user_id,
                    message: Some(message),
                },
            )?;
        }
        if app.name != manifest.name {
            let mut renamed = app;
            renamed.name = manifest.name;
            self.ctx.catalog.update_app(&renamed)?;
        }

        Ok(UpdateOutcome::Updated {
            version: version.id,
            file: new_file.id,
            name_changed,
        })
    }

    /// Name from the manifest on file, falling back to the recorded app name.
    fn previous_name(&self, app: &Webapp, file: &VersionFile) -> Result<String, RefreshError> {
        let stored = self.ctx.content.read(app.id, &file.content_key)?;
        let name = stored.as_deref().and_then(manifest_name);
        if name.is_none() {
            debug!(app = %app.id, key = %file.content_key, "stored manifest unreadable");
        }
        Ok(name.unwrap_or_else(|| app.name.clone()))
    }

    fn reject(&self, app: &Webapp, report: ValidationReport) -> Result<UpdateOutcome, RefreshError> {
        let mut message = String::from("Validation errors:\n");
        for issue in &report.errors {
            let _ = writeln!(message, "{issue}");
        }
        let _ = write!(
            message,
            "Please fix your manifest at {}",
            self.config.upload_url()
        );

        let newly_flagged = self.ctx.rereview.flag(
            app.id,
            RereviewTrigger {
                action: ActivityAction::RereviewManifestChange,
                version: app.current_version,
                user: self.config.task_user_id,
                message: Some(message),
            },
        )?;
        warn!(
            app = %app.id,
            reason = ?report.reason,
            errors = report.errors.len(),
            newly_flagged,
            "manifest failed validation"
        );
        Ok(UpdateOutcome::Invalid {
            report,
            newly_flagged,
        })
    }
}

#[async_trait]
impl AppTask for ManifestUpdater {
    async fn run(&self, ids: Vec<AppId>) -> anyhow::Result<TaskSummary> {
        Ok(self.update_manifests(&ids).await.summary())
    }
}
