use governance_audit::AuditError;
use governance_rereview::RereviewError;
use manifest_fetch::FetchError;
use manifest_validation::ValidationReport;
use marketplace_catalog::{AppId, CatalogError, FileId, VersionId};
use runtime_dispatch::TaskSummary;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("activity log: {0}")]
    Audit(#[from] AuditError),
    #[error("re-review queue: {0}")]
    Rereview(#[from] RereviewError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    Packaged,
    NoFile,
}

/// Result of refreshing one app.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// Remote content hashes the same as the file on record.
    Unchanged,
    Updated {
        version: VersionId,
        file: FileId,
        name_changed: bool,
    },
    /// Remote content changed but did not validate; no version was created.
    Invalid {
        report: ValidationReport,
        newly_flagged: bool,
    },
    FetchFailed(FetchError),
    Skipped(SkipReason),
    /// A store rejected a write.
    Failed(RefreshError),
}

impl UpdateOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

#[derive(Debug, Default)]
pub struct UpdateReport {
    pub outcomes: Vec<(AppId, UpdateOutcome)>,
}

impl UpdateReport {
    pub fn get(&self, app: AppId) -> Option<&UpdateOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| *id == app)
            .map(|(_, outcome)| outcome)
    }

    pub fn summary(&self) -> TaskSummary {
        let mut summary = TaskSummary {
            processed: self.outcomes.len(),
            ..Default::default()
        };
        for (_, outcome) in &self.outcomes {
            match outcome {
                UpdateOutcome::Unchanged => {}
                UpdateOutcome::Updated { name_changed, .. } => {
                    summary.changed += 1;
                    if *name_changed {
                        summary.flagged += 1;
                    }
                }
                UpdateOutcome::Invalid { newly_flagged, .. } => {
                    if *newly_flagged {
                        summary.flagged += 1;
                    }
                }
                UpdateOutcome::FetchFailed(_) | UpdateOutcome::Failed(_) => summary.failed += 1,
                UpdateOutcome::Skipped(_) => summary.skipped += 1,
            }
        }
        summary
    }
}
