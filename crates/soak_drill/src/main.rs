//! Workload driver for soaking a single-writer replicated SQL store.
//!
//! Starts a fleet of runners issuing writes, reads, and range deletes on
//! fixed ticks, reports whether this host is the cluster leader, and logs
//! rolling success/failure counters until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use soak_core::{
    is_local_leader, HarnessStats, MemStore, OpExecutor, OpKind, PgStore, Profile, Runner,
    RunnerId, StoreHandle,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// CLI entry point wrapper.
#[derive(Parser, Debug)]
#[command(name = "soak-drill")]
#[command(about = "Load and liveness harness for a replicated SQL store", long_about = None)]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Run(RunArgs),
}

/// CLI options for running the harness.
#[derive(Parser, Debug, Clone)]
struct RunArgs {
    /// Store endpoint (`host:port`, postgres wire).
    #[arg(long, default_value = "127.0.0.1:5432")]
    store: String,

    /// Database name.
    #[arg(long, default_value = "model")]
    dbname: String,

    /// Database user.
    #[arg(long, default_value = "postgres")]
    user: String,

    /// Tuning profile (`aggressive` or `conservative`).
    #[arg(long, default_value = "aggressive")]
    profile: Profile,

    /// Override the number of runners per operation kind.
    #[arg(long)]
    runners: Option<usize>,

    /// Maximum open store connections.
    #[arg(long)]
    max_open: Option<usize>,

    /// Idle store connections retained for reuse.
    #[arg(long)]
    max_idle: Option<usize>,

    /// Idle connection lifetime.
    #[arg(long)]
    idle_timeout: Option<humantime::Duration>,

    /// Budget for schema bootstrap before giving up.
    #[arg(long, default_value = "15s")]
    schema_timeout: humantime::Duration,

    /// Period between stats snapshots in the log.
    #[arg(long, default_value = "10s")]
    stats_interval: humantime::Duration,

    /// Drive an in-process store instead of a real endpoint (smoke mode).
    #[arg(long)]
    embedded: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Env-driven filtering so operators can tune verbosity without
    // rebuilding.
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("soak_core=info,soak_drill=info,warn")),
        )
        .init();

    let args = Args::parse();
    match args.cmd {
        Command::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = args.profile.config();
    if let Some(runners) = args.runners {
        config.runners_per_kind = runners;
    }
    if let Some(max_open) = args.max_open {
        config.pool.max_open = max_open;
    }
    if let Some(max_idle) = args.max_idle {
        config.pool.max_idle = max_idle;
    }
    if let Some(idle_timeout) = args.idle_timeout {
        config.pool.idle_timeout = idle_timeout.into();
    }
    anyhow::ensure!(config.runners_per_kind > 0, "--runners must be > 0");
    anyhow::ensure!(config.pool.max_open > 0, "--max-open must be > 0");
    let stats_interval: Duration = args.stats_interval.into();
    anyhow::ensure!(!stats_interval.is_zero(), "--stats-interval must be > 0");

    let store: Arc<dyn StoreHandle> = if args.embedded {
        info!("running against an in-process store");
        Arc::new(MemStore::new())
    } else {
        let (host, port) = split_endpoint(&args.store)?;
        let conn = format!(
            "host={host} port={port} user={} dbname={}",
            args.user, args.dbname
        );
        let store = PgStore::new(conn, config.pool);
        store
            .ensure_schema(args.schema_timeout.into())
            .await
            .with_context(|| format!("bootstrap schema on {}", args.store))?;
        Arc::new(store)
    };

    // Point-in-time check; leadership may move later and runners rely on
    // the store's own routing from then on.
    match is_local_leader(store.as_ref()).await {
        Ok(local) => info!(local_leader = local, "leadership resolved"),
        Err(err) => warn!(error = %err, "leadership check failed at bootstrap"),
    }

    let stats = Arc::new(HarnessStats::new());
    let executor = OpExecutor::new(store);
    let shutdown = CancellationToken::new();

    let mut tasks = Vec::new();
    for kind in OpKind::ALL {
        let profile = *config.profile(kind);
        for index in 0..config.runners_per_kind {
            let runner = Runner::new(
                RunnerId::new(kind, index),
                kind,
                profile,
                executor.clone(),
                stats.clone(),
            );
            tasks.push(runner.spawn(shutdown.clone()));
        }
    }
    info!(
        runners = tasks.len(),
        profile = %args.profile,
        "runner fleet started"
    );

    let stats_task = spawn_stats_ticker(stats.clone(), stats_interval, shutdown.clone());

    tokio::signal::ctrl_c()
        .await
        .context("wait for shutdown signal")?;
    info!("shutdown requested");
    shutdown.cancel();
    for task in tasks {
        let _ = task.await;
    }
    let _ = stats_task.await;

    let last = stats.snapshot();
    info!(failed = last.total_failed(), "harness stopped");
    Ok(())
}

/// Periodically log a counter snapshot until shutdown.
fn spawn_stats_ticker(
    stats: Arc<HarnessStats>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let snap = stats.snapshot();
            info!(
                write_ok = snap.write_ok,
                write_failed = snap.write_failed,
                read_ok = snap.read_ok,
                read_failed = snap.read_failed,
                delete_ok = snap.delete_ok,
                delete_failed = snap.delete_failed,
                "progress"
            );
        }
    })
}

/// Parse a `host:port` store endpoint.
fn split_endpoint(endpoint: &str) -> anyhow::Result<(&str, u16)> {
    let (host, port) = endpoint
        .rsplit_once(':')
        .with_context(|| format!("store endpoint {endpoint:?} must be host:port"))?;
    anyhow::ensure!(!host.is_empty(), "store endpoint {endpoint:?} must be host:port");
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid port in {endpoint:?}"))?;
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_parsing_accepts_host_port_only() {
        assert_eq!(split_endpoint("10.0.0.1:5432").unwrap(), ("10.0.0.1", 5432));
        assert!(split_endpoint("10.0.0.1").is_err());
        assert!(split_endpoint(":5432").is_err());
        assert!(split_endpoint("10.0.0.1:notaport").is_err());
    }
}
