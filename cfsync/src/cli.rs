///
/// This module implements the CLI interface for cfsync: command parsing, config loading,
/// wiring the HTTP client and guide source into the core pipeline, and printing reports.
///
/// All reconciliation logic lives in the [`cfsync-core`] crate. This module is strictly
/// CLI glue.
///
/// ## How To Use
/// - For command-line users: `cfsync sync --config cfsync.yml`, or `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`cfsync-core`]: ../../cfsync-core/
use crate::load_config::{load_config, read_config, CliConfig};
use crate::service::ArrClient;
use anyhow::Result;
use cfsync_core::cache::CacheStore;
use cfsync_core::contract::GuideSource;
use cfsync_core::guide::DirectoryGuide;
use cfsync_core::persister::{ApplyOptions, Cancellation};
use cfsync_core::synchronise::{synchronise_all, SyncOptions, SyncReport, SyncTarget};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;

/// CLI for cfsync: keep Radarr/Sonarr custom formats in line with the guide.
#[derive(Parser)]
#[clap(
    name = "cfsync",
    version,
    about = "Synchronise guide custom formats into Radarr/Sonarr instances"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronise custom formats to every configured instance
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Show what would change without touching any instance or the cache
        #[clap(long)]
        preview: bool,
        /// Only synchronise the named instance (repeatable)
        #[clap(long = "instance")]
        instances: Vec<String>,
    },
    /// List the custom formats available in the guide
    List {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync {
            config,
            preview,
            instances,
        } => {
            let config = load_config(config)?;
            tracing::info!(command = "sync", preview, "Starting synchronisation process");
            sync(config, preview, &instances).await
        }
        Commands::List { config } => {
            let config = read_config(config)?;
            tracing::info!(command = "list", "Listing guide custom formats");
            let guide = DirectoryGuide::new(config.guide_paths);
            let definitions = guide
                .fetch_definitions()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read guide: {e}"))?;
            for definition in &definitions {
                println!("{}  # {}", definition.content_id, definition.name);
            }
            Ok(())
        }
    }
}

async fn sync(config: CliConfig, preview: bool, only: &[String]) -> Result<()> {
    for name in only {
        if !config.instances.iter().any(|i| &i.name == name) {
            anyhow::bail!("Unknown instance: {name}");
        }
    }

    let mut targets = Vec::new();
    for instance in config.instances {
        if !only.is_empty() && !only.contains(&instance.name) {
            tracing::info!(instance = %instance.name, "Skipping instance not selected on the command line");
            continue;
        }
        let service = ArrClient::new(&instance.base_url, instance.api_key.expose())
            .map_err(|e| anyhow::anyhow!("Failed to construct client for {}: {e}", instance.name))?;
        targets.push(SyncTarget {
            cache: CacheStore::for_target(&config.cache_dir, &instance.base_url),
            name: instance.name,
            config: instance.sync,
            service,
        });
    }

    let cancellation = Cancellation::new();
    let on_interrupt = cancellation.clone();
    let interrupt = tokio::spawn(async move {
        if watch_interrupts(tokio::signal::ctrl_c, on_interrupt).await {
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });

    let options = SyncOptions {
        preview,
        apply: ApplyOptions {
            concurrency: config.concurrency,
            cancellation,
        },
    };
    let guide = DirectoryGuide::new(config.guide_paths);

    println!("Synchronise starting...");
    let outcomes = synchronise_all(&guide, &targets, &options).await;
    interrupt.abort();

    let outcomes = outcomes.map_err(|e| {
        tracing::error!(command = "sync", error = %e, "Synchronisation failed");
        anyhow::anyhow!("Synchronisation failed: {e}")
    })?;

    let mut failed = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(report) => {
                print_report(&report);
                if !report.is_success() {
                    failed.push(outcome.target);
                }
            }
            Err(e) => {
                eprintln!("[ERROR] {}: {e}", outcome.target);
                failed.push(outcome.target);
            }
        }
    }

    if failed.is_empty() {
        tracing::info!(command = "sync", "Synchronisation complete");
        Ok(())
    } else {
        tracing::error!(command = "sync", failed = ?failed, "Synchronisation finished with errors");
        Err(anyhow::anyhow!(
            "Synchronisation incomplete for: {}",
            failed.join(", ")
        ))
    }
}

const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Cancels on the first interrupt. Returns true when a second interrupt
/// arrives, meaning the caller should exit without waiting for requests.
async fn watch_interrupts<F, Fut>(mut next_interrupt: F, cancellation: Cancellation) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return false;
    }
    tracing::warn!("Interrupt received, finishing in-flight requests (press Ctrl-C again to exit now)");
    cancellation.cancel();

    if next_interrupt().await.is_err() {
        return false;
    }
    tracing::error!("Second interrupt received, exiting immediately");
    true
}

fn print_report(report: &SyncReport) {
    let heading = if report.preview { "Preview" } else { "Synchronise complete" };
    println!("{heading}: {}", report.target);
    println!(
        "  processed {}, created {}, updated {}, unchanged {}, deleted {}",
        report.processed, report.created, report.updated, report.unchanged, report.deleted
    );
    for (old, new) in &report.renamed {
        println!("  renamed: {old} -> {new}");
    }
    for selector in &report.unmatched {
        println!("  not in guide: {selector}");
    }
    for failure in &report.failures {
        println!("  failed: {failure}");
    }
    if report.skipped > 0 {
        println!("  skipped (cancelled): {}", report.skipped);
    }
    if let Some(e) = &report.cache_error {
        println!("  cache not saved: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[tokio::test]
    async fn first_interrupt_cancels_without_exiting() {
        let cancellation = Cancellation::new();
        let mut calls = 0;
        let forced = watch_interrupts(
            || {
                calls += 1;
                let first = calls == 1;
                async move {
                    if first {
                        Ok(())
                    } else {
                        Err(io::Error::new(io::ErrorKind::Other, "signal stream closed"))
                    }
                }
            },
            cancellation.clone(),
        )
        .await;

        assert!(!forced);
        assert!(cancellation.is_cancelled());
    }

    #[tokio::test]
    async fn second_interrupt_forces_exit() {
        let cancellation = Cancellation::new();

        let forced = watch_interrupts(|| async { Ok(()) }, cancellation.clone()).await;

        assert!(forced);
        assert!(cancellation.is_cancelled());
    }

    #[tokio::test]
    async fn failed_signal_registration_changes_nothing() {
        let cancellation = Cancellation::new();

        let forced = watch_interrupts(
            || async { Err(io::Error::new(io::ErrorKind::Other, "no handler")) },
            cancellation.clone(),
        )
        .await;

        assert!(!forced);
        assert!(!cancellation.is_cancelled());
    }
}
