use anyhow::Result;
use clap::Parser;
use kindred::{
    constants::RECONCILE_BATCH_SIZE,
    db::{get_db_pool, DatabaseConfig},
    services::{build_match_engine, MatchEngine},
    utils::{config::Config, init_logging},
};
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};

/// Re-projects matches into the presence store until every match has its
/// user documents and chat settings written.
#[derive(Parser, Debug)]
#[command(name = "presence_reconciler")]
struct Args {
    /// Run a single pass and exit
    #[arg(long)]
    once: bool,

    /// Re-project one specific pair, even if already synced (requires --user-b)
    #[arg(long, requires = "user_b")]
    user_a: Option<i32>,

    #[arg(long, requires = "user_a")]
    user_b: Option<i32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    info!("Starting presence reconciler...");

    let config = Config::from_env()?;
    if config.firestore.is_none() {
        anyhow::bail!(
            "FIRESTORE_PROJECT_ID and FIRESTORE_ACCESS_TOKEN must be set to reconcile presence"
        );
    }

    let db_config = DatabaseConfig::from_env()?;
    let pool = get_db_pool(&db_config).await?;
    let engine = build_match_engine(pool, &config)?;

    if let (Some(user_a), Some(user_b)) = (args.user_a, args.user_b) {
        return reproject_pair(&engine, user_a, user_b).await;
    }

    if args.once {
        run_pass(&engine).await?;
        return Ok(());
    }

    run_reconciler(&engine, Duration::from_secs(config.reconcile_interval_secs)).await
}

async fn run_reconciler(engine: &MatchEngine, every: Duration) -> Result<()> {
    let mut interval = time::interval(every);
    let mut iter_count: usize = 0;

    loop {
        interval.tick().await;
        iter_count += 1;

        match run_pass(engine).await {
            Ok(0) if iter_count % 20 == 0 => info!("No unsynced matches"),
            Ok(_) => {}
            Err(e) => error!("Reconciler pass {} failed: {}", iter_count, e),
        }
    }
}

/// One batch. Returns how many matches were found unsynced.
async fn run_pass(engine: &MatchEngine) -> Result<usize> {
    let pending = engine.unsynced_matches(RECONCILE_BATCH_SIZE).await?;
    if pending.is_empty() {
        return Ok(0);
    }

    info!("Found {} matches with incomplete presence", pending.len());

    let mut synced = 0;
    for pair in &pending {
        match engine.reproject_presence(pair).await {
            Ok(true) => synced += 1,
            Ok(false) => warn!("Match {} still incomplete, will retry", pair.match_id()),
            Err(e) => error!("Failed to re-project match {}: {}", pair.match_id(), e),
        }
    }

    info!("Synced {}/{} matches", synced, pending.len());
    Ok(pending.len())
}

async fn reproject_pair(engine: &MatchEngine, user_a: i32, user_b: i32) -> Result<()> {
    let Some(pair) = engine.match_pair(user_a, user_b).await? else {
        warn!("No mutual match between {} and {}", user_a, user_b);
        return Ok(());
    };

    if engine.reproject_presence(&pair).await? {
        info!("Match {} re-projected", pair.match_id());
    } else {
        warn!("Match {} re-projection incomplete", pair.match_id());
    }
    Ok(())
}
