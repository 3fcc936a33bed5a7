use std::sync::Arc;

use chrono::{Duration, Utc};
use governance_audit::{ActivityAction, ActivityLog};
use governance_rereview::RereviewQueue;
use manifest_fetch::{FetchConfig, HttpManifestFetcher};
use manifest_refresh::{ManifestUpdater, RefreshConfig, RefreshContext, TASK_NAME};
use manifest_validation::{ManifestValidator, ValidationConfig};
use marketplace_catalog::{
    AppId, AppKind, AppStatus, Catalog, ContentHash, ContentStore, FileStatus, FsContentStore,
    MemoryCatalog, NewApp, NewFile, Platform,
};
use runtime_dispatch::{AppFilter, DispatchConfig, DispatchSummary, Dispatcher, TaskRegistry};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONTENT_TYPE: &str = "application/x-web-app-manifest+json";

fn original() -> Value {
    json!({
        "version": "0.1",
        "name": "MozillaBall",
        "description": "Exciting Open Web development action!",
        "icons": {
            "16": "http://test.com/icon-16.png",
            "48": "http://test.com/icon-48.png",
            "128": "http://test.com/icon-128.png"
        },
        "installs_allowed_from": ["*"]
    })
}

fn with(mut manifest: Value, key: &str, value: Value) -> Value {
    manifest[key] = value;
    manifest
}

struct Marketplace {
    server: MockServer,
    _content_dir: TempDir,
    catalog: MemoryCatalog,
    content: FsContentStore,
    activity: ActivityLog,
    rereview: RereviewQueue,
    dispatcher: Dispatcher,
}

impl Marketplace {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let content_dir = tempfile::tempdir().unwrap();
        let catalog = MemoryCatalog::new();
        let content = FsContentStore::new(content_dir.path());
        let activity = ActivityLog::new();
        let rereview = RereviewQueue::new(activity.clone());

        let fetcher = HttpManifestFetcher::new(FetchConfig {
            timeout_secs: 5,
            ..Default::default()
        })
        .unwrap();
        let updater = ManifestUpdater::new(
            RefreshConfig {
                site_url: "http://test".into(),
                ..Default::default()
            },
            RefreshContext {
                catalog: Arc::new(catalog.clone()),
                content: Arc::new(content.clone()),
                activity: activity.clone(),
                rereview: rereview.clone(),
            },
            Arc::new(fetcher),
            ManifestValidator::new(ValidationConfig::default()).unwrap(),
        );
        let mut registry = TaskRegistry::new();
        registry.register(
            TASK_NAME,
            AppFilter::hosted_public_webapps(),
            Arc::new(updater),
        );
        let dispatcher = Dispatcher::new(
            Arc::new(catalog.clone()),
            registry,
            DispatchConfig::default(),
        );

        Self {
            server,
            _content_dir: content_dir,
            catalog,
            content,
            activity,
            rereview,
            dispatcher,
        }
    }

    /// List an app whose stored manifest is `original()`, served at `/<slug>.webapp`.
    fn list_app(&self, slug: &str, app: impl FnOnce(NewApp) -> NewApp) -> AppId {
        let url = format!("{}/{slug}.webapp", self.server.uri());
        let record = self
            .catalog
            .insert_app(app(NewApp::hosted("MozillaBall", url)))
            .unwrap();
        let version = self
            .catalog
            .create_version(record.id, "0.1", Utc::now() - Duration::days(1))
            .unwrap();
        let stored = serde_json::to_vec(&original()).unwrap();
        self.content
            .write(record.id, "manifest.webapp", &stored)
            .unwrap();
        self.catalog
            .create_file(
                version.id,
                NewFile {
                    platform: Platform::All,
                    filename: "manifest.webapp".into(),
                    hash: ContentHash::of(&stored),
                    status: FileStatus::Public,
                    content_key: "manifest.webapp".into(),
                },
            )
            .unwrap();
        self.catalog
            .set_current_version(record.id, version.id)
            .unwrap();
        record.id
    }

    async fn serve(&self, slug: &str, manifest: &Value) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(format!("/{slug}.webapp")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(serde_json::to_vec(manifest).unwrap(), CONTENT_TYPE),
            )
            .mount(&self.server)
            .await;
    }

    async fn process(&self) -> DispatchSummary {
        self.dispatcher.run(TASK_NAME).await.unwrap()
    }

    fn version_count(&self, app: AppId) -> usize {
        self.catalog.versions(app).unwrap().len()
    }
}

#[tokio::test]
async fn changed_manifest_creates_version_and_stores_content() {
    let market = Marketplace::start().await;
    let app = market.list_app("ball", |app| app);
    let old_file = market.catalog.latest_file(app).unwrap().unwrap();
    let new = with(original(), "version", json!("1.0"));
    market.serve("ball", &new).await;

    let summary = market.process().await;
    assert_eq!(summary.selected, 1);
    assert_eq!(summary.totals.changed, 1);

    assert_eq!(market.version_count(app), 2);
    let latest = market.catalog.latest_file(app).unwrap().unwrap();
    assert_ne!(latest, old_file);
    let stored = market.content.read(app, &latest.content_key).unwrap().unwrap();
    assert_eq!(stored, serde_json::to_vec(&new).unwrap());
    assert_eq!(ContentHash::of(&stored), latest.hash);

    let entries = market.activity.for_app(app);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, ActivityAction::ManifestUpdated);
}

#[tokio::test]
async fn unchanged_manifest_is_a_no_op() {
    let market = Marketplace::start().await;
    let app = market.list_app("ball", |app| app);
    market.serve("ball", &original()).await;

    let summary = market.process().await;
    assert_eq!(summary.totals.processed, 1);
    assert_eq!(summary.totals.changed, 0);
    assert_eq!(market.version_count(app), 1);
    assert!(market.activity.for_app(app).is_empty());
}

#[tokio::test]
async fn each_distinct_change_adds_one_version() {
    let market = Marketplace::start().await;
    let app = market.list_app("ball", |app| app);
    for (idx, version) in ["1.0", "1.1", "1.1", "1.2"].iter().enumerate() {
        market
            .serve("ball", &with(original(), "version", json!(version)))
            .await;
        market.process().await;
        let expected = match idx {
            0 => 2,
            1 | 2 => 3,
            _ => 4,
        };
        assert_eq!(market.version_count(app), expected, "after {version}");
    }
    let current = market.catalog.current_version(app).unwrap().unwrap();
    assert_eq!(current.version, "1.2");
}

#[tokio::test]
async fn name_change_queues_for_rereview() {
    let market = Marketplace::start().await;
    let app = market.list_app("ball", |app| app);
    let renamed = with(
        with(original(), "version", json!("1.0")),
        "name",
        json!("Mozilla Ball Ultimate Edition"),
    );
    market.serve("ball", &renamed).await;

    assert_eq!(market.rereview.len(), 0);
    let summary = market.process().await;
    assert_eq!(summary.totals.flagged, 1);
    assert_eq!(market.rereview.len(), 1);
    assert!(market.rereview.contains(app));
    assert_eq!(market.activity.for_app(app).len(), 2);
}

#[tokio::test]
async fn validation_failure_queues_once() {
    let market = Marketplace::start().await;
    let app = market.list_app("ball", |app| app);
    let invalid = with(
        with(original(), "version", json!("1.0")),
        "locale",
        json!("en-US"),
    );
    market.serve("ball", &invalid).await;

    market.process().await;
    assert_eq!(market.rereview.len(), 1);
    let entries = market.activity.for_app(app);
    assert_eq!(entries.len(), 1);
    let details: String = entries.iter().map(|e| e.details_text()).collect();
    assert!(details.contains("http://test/en-US/developers/upload"));
    assert_eq!(market.version_count(app), 1);

    market.process().await;
    assert_eq!(market.rereview.len(), 1);
    assert_eq!(market.version_count(app), 1);
}

#[tokio::test]
async fn server_error_leaves_app_untouched() {
    let market = Marketplace::start().await;
    let app = market.list_app("ball", |app| app);
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&market.server)
        .await;

    let summary = market.process().await;
    assert_eq!(summary.totals.failed, 1);
    assert_eq!(market.version_count(app), 1);
    assert!(market.activity.is_empty());
    assert!(market.rereview.is_empty());
}

#[tokio::test]
async fn ineligible_apps_are_never_fetched() {
    let market = Marketplace::start().await;
    let extension = market.list_app("extension", |app| NewApp {
        kind: AppKind::Extension,
        ..app
    });
    let disabled = market.list_app("disabled", |app| NewApp {
        status: AppStatus::Disabled,
        ..app
    });
    let pending = market.list_app("pending", |app| NewApp {
        status: AppStatus::Pending,
        ..app
    });
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                serde_json::to_vec(&with(original(), "version", json!("9.9"))).unwrap(),
                CONTENT_TYPE,
            ),
        )
        .expect(0)
        .mount(&market.server)
        .await;

    let summary = market.process().await;
    assert_eq!(summary.selected, 0);
    for app in [extension, disabled, pending] {
        assert_eq!(market.version_count(app), 1);
    }
    assert!(market.activity.is_empty());
}
