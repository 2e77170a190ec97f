//! ModSync Agent - Main entry point
//!
//! Runs one sync attempt against the configured server and lists the mods
//! the game should load.

use anyhow::Result;
use clap::Parser;
use modsync_agent::{
    config::Config,
    daemon::shutdown::ShutdownCoordinator,
    locator::SyncLocator,
    settings::Role,
    sync::{orchestrator::CategoryStatus, SyncContext, SyncOrchestrator},
    transfer::{
        fetch::HttpFetcher,
        progress::{format_bytes, ProgressCallback, SyncProgress},
    },
    utils,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Game directory holding the sync directory, mods, config and resourcepacks
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    game_dir: PathBuf,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Run as a dedicated server (resources are not synced)
    #[arg(long)]
    server: bool,

    /// Client version checked against the manifest's accepted range
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    client_version: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = args.config {
        Config::from_file(&config_path)?
    } else {
        Config::default()
    };

    // Initialize logging
    if let Some(level) = args.log_level {
        config.log.level = level;
    }
    utils::logger::init(&config.log)?;

    let role = if args.server { Role::Server } else { Role::Client };

    tracing::info!(
        "Starting modsync-agent v{} ({:?}, game dir {})",
        env!("CARGO_PKG_VERSION"),
        role,
        args.game_dir.display()
    );

    let ctx = SyncContext::load(
        &args.game_dir,
        role,
        args.client_version,
        config.performance.clone(),
    )?;
    let fetcher = Arc::new(HttpFetcher::new(&config.http)?);

    // Create shutdown coordinator
    let shutdown_coordinator = Arc::new(ShutdownCoordinator::new());
    let signal_watcher = {
        let coordinator = Arc::clone(&shutdown_coordinator);
        tokio::spawn(async move { coordinator.wait_for_signal().await })
    };

    let progress: ProgressCallback = Arc::new(|p: &SyncProgress| {
        tracing::info!(
            "[{}] {}/{} files ({:.0}%), {} downloaded",
            p.category,
            p.files_done,
            p.total_files,
            p.percent_complete(),
            format_bytes(p.bytes_downloaded)
        );
    });

    let orchestrator = SyncOrchestrator::new(ctx.clone(), fetcher)
        .with_cancel(shutdown_coordinator.token())
        .with_progress(progress);
    let outcome = orchestrator.run().await;

    // Stop listening for signals once the attempt is over
    shutdown_coordinator.shutdown();
    let _ = signal_watcher.await;

    for category in &outcome.categories {
        match &category.status {
            CategoryStatus::Applied(report) => {
                tracing::info!(
                    "{}: {} up to date, {} downloaded ({}), {} deleted, {} failed",
                    category.category,
                    category.satisfied,
                    report.downloaded,
                    format_bytes(report.bytes_downloaded),
                    report.deleted,
                    report.failure_count()
                );
                for (entry, error) in &report.failed {
                    tracing::error!("  {} ({}): {}", entry.local_path(), entry.url(), error);
                }
                for (path, error) in &report.delete_failures {
                    tracing::error!("  cannot delete {}: {}", path.display(), error);
                }
                for (path, reason) in &report.unreadable {
                    tracing::error!("  cannot verify {}: {}", path.display(), reason);
                }
            }
            CategoryStatus::Skipped(reason) => tracing::info!("{}: skipped ({})", category.category, reason),
            CategoryStatus::Failed(e) => tracing::error!("{}: {}", category.category, e),
        }
    }

    if let Some(message) = outcome.user_message() {
        eprintln!("{}", message);
    }

    let locator = SyncLocator::from_outcome(&ctx, &outcome);
    locator.init_mods_dir()?;
    for path in locator.scan_mods()? {
        println!("{}", path.display());
    }

    if !outcome.use_synced_content {
        tracing::warn!("Sync ended as {:?}, synced content not used", outcome.state);
        std::process::exit(1);
    }

    Ok(())
}
