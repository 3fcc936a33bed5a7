use marketplace_catalog::UserId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Absolute site root used to build developer-facing links.
    pub site_url: String,
    /// Account recorded as the actor of automated changes.
    pub task_user_id: UserId,
    pub manifest_filename: String,
    /// Version string used when a manifest omits `version`.
    pub default_version: String,
    pub upload_path: String,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            site_url: "http://localhost".into(),
            task_user_id: UserId(4_043_307),
            manifest_filename: "manifest.webapp".into(),
            default_version: "1.0".into(),
            upload_path: "/en-US/developers/upload".into(),
        }
    }
}

impl RefreshConfig {
    /// Page where developers resubmit a corrected manifest.
    pub fn upload_url(&self) -> String {
        format!(
            "{}/{}",
            self.site_url.trim_end_matches('/'),
            self.upload_path.trim_start_matches('/')
        )
    }
}
