//! cfsync - keep firewalld allow rules in sync with Cloudflare's IP ranges.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cfsync::backend::{check_root, FirewalldBackend};
use cfsync::cli::Cli;
use cfsync::config::Config;
use cfsync::lock::LockGuard;
use cfsync::reconciler::{Outcome, Plan, Reconciler};
use cfsync::source::CloudflareSource;
use cfsync::store::FileStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load(&cli.config)?;

    let source = CloudflareSource::new(
        &config.endpoint,
        Duration::from_secs(config.timeout_secs),
    )?;
    let store = FileStore::new(&config.cache_path);
    let backend = FirewalldBackend::new(&config.zone, config.permanent);
    let reconciler = Reconciler::new(&source, &store, &backend, config.allowed_ports);

    if cli.dry_run {
        return dry_run(&reconciler).await;
    }

    check_root()?;
    let _lock = LockGuard::acquire()?;

    match reconciler.run().await? {
        Outcome::InSync => {
            info!("Allow rules already in sync");
        }
        Outcome::Updated {
            etag,
            rules_removed,
            rules_added,
        } => {
            println!(
                "[OK] Replaced {} rules with {} rules (snapshot {})",
                rules_removed, rules_added, etag
            );
        }
    }

    Ok(())
}

/// Fetch and compare without touching the firewall or the cache.
async fn dry_run(reconciler: &Reconciler<'_>) -> Result<()> {
    let plan = reconciler.plan().await?;
    match &plan {
        Plan::InSync { etag } => {
            println!("[DRY RUN] In sync (snapshot {})", etag);
        }
        Plan::Replace {
            previous,
            published,
        } => {
            let (removed, added) = reconciler.preview(&plan);
            println!(
                "[DRY RUN] Would replace {} rules with {} rules ({} -> {})",
                removed,
                added,
                previous.etag.as_deref().unwrap_or("none"),
                published.etag
            );
        }
    }
    Ok(())
}
