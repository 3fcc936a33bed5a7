//! Run a background task over every marketplace app it applies to.
//!
//! Marketplace state (catalog, activity log, re-review queue) is read from a
//! JSON snapshot and written back once the task finishes. Manifest bytes live
//! under `--content-root`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use governance_audit::{ActivityEntry, ActivityLog};
use governance_rereview::{RereviewEntry, RereviewQueue};
use manifest_fetch::{FetchConfig, HttpManifestFetcher};
use manifest_refresh::{ManifestUpdater, RefreshConfig, RefreshContext, TASK_NAME};
use manifest_validation::{ManifestValidator, ValidationConfig};
use marketplace_catalog::{CatalogSnapshot, FsContentStore, MemoryCatalog};
use runtime_dispatch::{AppFilter, DispatchConfig, Dispatcher, TaskRegistry};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Run a background task over marketplace apps")]
struct Args {
    /// Task to run, e.g. `update_manifests`.
    #[arg(long)]
    task: String,

    /// Marketplace state snapshot (JSON), rewritten after the run.
    #[arg(long)]
    state: PathBuf,

    /// Directory holding stored manifest content.
    #[arg(long, value_name = "DIR")]
    content_root: PathBuf,

    /// Optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the selected app ids without running the task.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ToolsConfig {
    refresh: RefreshConfig,
    fetch: FetchConfig,
    validation: ValidationConfig,
    dispatch: DispatchConfig,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct MarketplaceState {
    catalog: CatalogSnapshot,
    activity: Vec<ActivityEntry>,
    rereview: Vec<RereviewEntry>,
}

fn load_config(path: Option<&Path>) -> Result<ToolsConfig> {
    let Some(path) = path else {
        return Ok(ToolsConfig::default());
    };
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

fn load_state(path: &Path) -> Result<MarketplaceState> {
    if !path.exists() {
        return Ok(MarketplaceState::default());
    }
    let raw = fs::read(path).with_context(|| format!("reading state {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parsing state {}", path.display()))
}

fn save_state(path: &Path, state: &MarketplaceState) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let encoded = serde_json::to_vec_pretty(state).context("serialising state")?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, encoded).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let state = load_state(&args.state)?;

    let catalog = MemoryCatalog::from_snapshot(state.catalog);
    let activity = ActivityLog::from_entries(state.activity);
    let rereview = RereviewQueue::from_entries(state.rereview, activity.clone());

    let fetcher = HttpManifestFetcher::new(config.fetch).context("building HTTP client")?;
    let validator =
        ManifestValidator::new(config.validation).context("compiling validation rules")?;
    let updater = ManifestUpdater::new(
        config.refresh,
        RefreshContext {
            catalog: Arc::new(catalog.clone()),
            content: Arc::new(FsContentStore::new(&args.content_root)),
            activity: activity.clone(),
            rereview: rereview.clone(),
        },
        Arc::new(fetcher),
        validator,
    );

    let mut registry = TaskRegistry::new();
    registry.register(
        TASK_NAME,
        AppFilter::hosted_public_webapps(),
        Arc::new(updater),
    );
    let dispatcher = Dispatcher::new(Arc::new(catalog.clone()), registry, config.dispatch);

    if args.dry_run {
        let ids = dispatcher.select(&args.task)?;
        let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
        println!("task={} selected=[{}]", args.task, rendered.join(","));
        return Ok(());
    }

    let summary = dispatcher.run(&args.task).await?;
    info!(task = %summary.task, selected = summary.selected, "task finished");

    save_state(
        &args.state,
        &MarketplaceState {
            catalog: catalog.snapshot()?,
            activity: activity.all(),
            rereview: rereview.entries(),
        },
    )?;

    let totals = summary.totals;
    println!(
        "task={} selected={} chunks={} failed_chunks={} processed={} changed={} flagged={} failed={} skipped={}",
        summary.task,
        summary.selected,
        summary.chunks,
        summary.failed_chunks,
        totals.processed,
        totals.changed,
        totals.flagged,
        totals.failed,
        totals.skipped,
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Args::parse()).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
