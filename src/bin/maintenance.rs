use std::collections::HashSet;
use std::env;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use jobboard::{
    applications::Applications,
    config::AppConfig,
    db,
    storage::{ArtifactStore, LocalArtifactStore},
};

const USAGE: &str = "Usage: maintenance prune-artifacts [--dry-run] [--grace-minutes N]";

/// Files younger than this may belong to a submission still in flight.
const DEFAULT_GRACE_MINUTES: u64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("prune-artifacts") => {
            let mut dry_run = false;
            let mut grace_minutes = DEFAULT_GRACE_MINUTES;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--dry-run" => dry_run = true,
                    "--grace-minutes" => {
                        grace_minutes = args
                            .next()
                            .and_then(|value| value.parse().ok())
                            .context("--grace-minutes needs a whole number")?;
                    }
                    other => {
                        eprintln!("Unknown option: {other}\n{USAGE}");
                        std::process::exit(1);
                    }
                }
            }
            prune_artifacts(dry_run, Duration::from_secs(grace_minutes * 60)).await?
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Removes stored resumes that no application row points at.
async fn prune_artifacts(dry_run: bool, grace: Duration) -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        upload_dir = %config.upload_dir.display(),
        dry_run,
        grace_minutes = grace.as_secs() / 60,
        "loaded jobboard configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let store = LocalArtifactStore::new(config.upload_dir.clone());

    let referenced: HashSet<String> = {
        let mut conn = pool.get().context("failed to get database connection")?;
        Applications::new(&mut conn)
            .all_resume_paths()
            .context("failed to load resume paths")?
            .into_iter()
            .collect()
    };

    let cutoff = SystemTime::now()
        .checked_sub(grace)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let orphans = store
        .unreferenced(&referenced, cutoff)
        .await
        .context("failed to list stored resumes")?;

    if orphans.is_empty() {
        println!("No orphaned resumes found.");
        return Ok(());
    }

    if dry_run {
        for key in &orphans {
            println!("would delete {key}");
        }
        println!("{} orphaned resumes found.", orphans.len());
        return Ok(());
    }

    println!("Deleting {} orphaned resumes…", orphans.len());

    let mut failed = 0usize;
    for key in &orphans {
        if let Err(err) = store.delete(key).await {
            failed += 1;
            eprintln!("Failed to delete {key}: {err}");
        }
    }

    println!("Orphaned resumes removed ({failed} failures).");
    Ok(())
}
