//! High-level pipeline: orchestrates cache → process → diff → apply → cache
//! for every configured remote target.
//!
//! # Major Types
//! - [`SyncTarget`]: one remote instance with its config, service and cache store
//! - [`SyncOptions`]: preview flag and persister options shared by all targets
//! - [`SyncReport`]: per-target summary, the only externally visible result
//!
//! # Responsibilities
//! - Fetch the guide once per run; a fetch failure aborts before any mutation
//! - Per target: load cache, process definitions, list remote custom formats
//!   (fatal for that target on failure), build and apply the transaction,
//!   fold results into the cache and save it
//! - Run targets concurrently; they share nothing mutable
//!
//! # Error Handling
//! Per-item failures end up in [`SyncReport::failures`]. A failed cache save is
//! logged and reported in [`SyncReport::cache_error`]; remote changes already
//! applied are not rolled back. Re-running converges.
//!
//! # Navigation
//! - Entrypoints: [`synchronise_all`], [`synchronise`]

use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};

use crate::cache::CacheStore;
use crate::config::SyncConfig;
use crate::contract::{CustomFormatService, GuideDefinition, GuideSource};
use crate::error::{ItemFailure, SyncError};
use crate::persister::{self, AppliedResult, ApplyOptions};
use crate::processor;
use crate::transaction;

/// One remote instance to synchronise.
#[derive(Debug)]
pub struct SyncTarget<S> {
    pub name: String,
    pub config: SyncConfig,
    pub service: S,
    pub cache: CacheStore,
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Compute and report the transaction without touching the remote or the cache.
    pub preview: bool,
    pub apply: ApplyOptions,
}

/// Summary of one target's run. In preview mode the counts are planned, not applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub target: String,
    pub preview: bool,
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub renamed: Vec<(String, String)>,
    pub unmatched: Vec<String>,
    pub failures: Vec<ItemFailure>,
    pub cache_error: Option<String>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.cache_error.is_none() && self.skipped == 0
    }
}

#[derive(Debug)]
pub struct TargetOutcome {
    pub target: String,
    pub result: Result<SyncReport, SyncError>,
}

/// Fetches the guide once and synchronises every target concurrently.
pub async fn synchronise_all<G, S>(
    guide: &G,
    targets: &[SyncTarget<S>],
    options: &SyncOptions,
) -> Result<Vec<TargetOutcome>, SyncError>
where
    G: GuideSource + ?Sized,
    S: CustomFormatService,
{
    info!(targets = targets.len(), preview = options.preview, "[SYNC] Starting synchronisation");

    let definitions = guide.fetch_definitions().await.map_err(|e| {
        error!(error = %e, "[SYNC][ERROR] Failed to fetch guide definitions");
        SyncError::GuideFetch(e)
    })?;
    info!(definitions = definitions.len(), "[SYNC] Guide fetched");

    let runs = targets.iter().map(|target| {
        let definitions = &definitions;
        async move {
            TargetOutcome {
                target: target.name.clone(),
                result: synchronise(target, definitions, options).await,
            }
        }
    });
    Ok(join_all(runs).await)
}

/// Runs the full pipeline for one target.
pub async fn synchronise<S>(
    target: &SyncTarget<S>,
    definitions: &[GuideDefinition],
    options: &SyncOptions,
) -> Result<SyncReport, SyncError>
where
    S: CustomFormatService,
{
    let span = info_span!("target", name = %target.name);
    run_target(target, definitions, options).instrument(span).await
}

async fn run_target<S>(
    target: &SyncTarget<S>,
    definitions: &[GuideDefinition],
    options: &SyncOptions,
) -> Result<SyncReport, SyncError>
where
    S: CustomFormatService,
{
    target.config.trace_loaded(&target.name);
    let mut cache = target.cache.load();

    let processed = processor::process(definitions, &target.config, &cache);
    for selector in &processed.unmatched {
        warn!(selector = %selector, "[SYNC] Configured custom format not found in guide");
    }

    let remote = target.service.list().await.map_err(|e| {
        error!(error = %e, "[SYNC][ERROR] Failed to list remote custom formats");
        SyncError::RemoteListing {
            target: target.name.clone(),
            message: e.to_string(),
        }
    })?;
    info!(remote = remote.len(), "[SYNC] Listed remote custom formats");

    let txn = transaction::build(
        &processed.processed,
        &processed.orphaned,
        &remote,
        target.config.delete_old_custom_formats,
    );

    let mut report = SyncReport {
        target: target.name.clone(),
        preview: options.preview,
        processed: processed.processed.len(),
        unchanged: txn.unchanged.len(),
        renamed: processed.renamed,
        unmatched: processed.unmatched,
        ..Default::default()
    };

    if options.preview {
        report.created = txn.creates.len();
        report.updated = txn.updates.len();
        report.deleted = txn.deletes.len();
        info!(?report, "[SYNC] Preview complete, nothing applied");
        return Ok(report);
    }

    let applied: AppliedResult = if txn.is_empty() {
        info!("[SYNC] Remote already up to date");
        AppliedResult::default()
    } else {
        persister::apply(&txn, &target.service, &options.apply).await
    };

    cache.record(&txn, &applied);
    if let Err(e) = target.cache.save(&cache) {
        error!(error = %e, "[SYNC][ERROR] Failed to save cache");
        report.cache_error = Some(e.to_string());
    }

    report.created = applied.created.len();
    report.updated = applied.updated.len();
    report.deleted = applied.deleted.len();
    report.skipped = applied.skipped;
    report.failures = applied.failures;

    info!(
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        deleted = report.deleted,
        failed = report.failures.len(),
        "[SYNC] Target synchronised"
    );
    Ok(report)
}
