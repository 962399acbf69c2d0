use anyhow::{bail, Context};
use clap::Parser;
use futures::future::join_all;
use serde::Serialize;
use snmp_poller::config::PollerConfig;
use snmp_poller::snmp::{
    ErrorKind, ItemResult, ItemValue, NetConnector, PollerSession, StringIndex,
};
use snmp_poller::worker::{InterfaceJob, WorkerPool};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

fn init_logger() {
    // LOG_LEVEL wins over RUST_LOG
    let filter = env::var("LOG_LEVEL")
        .or_else(|_| env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Parser)]
#[command(name = "snmp-poller")]
#[command(about = "Adaptive SNMP value poller", long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long, env = "SNMP_POLLER_CONFIG")]
    config: PathBuf,

    /// Run a single polling pass and exit
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Seconds between passes, overriding the configuration file
    #[arg(long, env = "SNMP_POLLER_INTERVAL")]
    interval: Option<u64>,

    /// Number of poller worker threads, overriding the configuration file
    #[arg(long, env = "SNMP_POLLER_WORKERS")]
    workers: Option<usize>,

    /// Walk this OID on --interface and print its rows instead of polling
    #[arg(long, requires = "interface")]
    walk: Option<String>,

    /// Interface id used by --walk
    #[arg(long)]
    interface: Option<String>,
}

/// One JSON line on stdout per polled item
#[derive(Debug, Serialize)]
struct ItemLine<'a> {
    interface: &'a str,
    item: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a ItemValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
}

impl<'a> ItemLine<'a> {
    fn new(interface: &'a str, result: &'a ItemResult) -> Self {
        Self {
            interface,
            item: &result.id,
            value: result.value(),
            error: result.error().map(|e| e.message()),
            kind: result.error().map(|e| e.kind()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    let config = PollerConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let jobs = config
        .interfaces
        .iter()
        .map(|interface| -> anyhow::Result<InterfaceJob> {
            Ok(InterfaceJob {
                id: interface.id.clone(),
                target: interface.target()?,
                bulk: interface.bulk,
                items: interface.items(),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let connector = Arc::new(NetConnector);
    let settings = config.settings();
    let string_indices = config.string_indices;
    let workers = args.workers.unwrap_or(config.workers);

    let pool = WorkerPool::spawn(workers, settings.max_batch_items, || {
        let session = PollerSession::new(connector.clone(), settings.clone());
        if string_indices {
            session.with_renderer(Box::new(StringIndex))
        } else {
            session
        }
    })
    .context("starting poller workers")?;

    tracing::info!(
        "SNMP poller starting with {} interfaces on {} workers",
        jobs.len(),
        pool.len()
    );

    if let Some(oid) = args.walk {
        let interface = args.interface.unwrap_or_default();
        let Some(job) = jobs.into_iter().find(|job| job.id == interface) else {
            bail!("unknown interface {}", interface);
        };
        let result = walk_once(&pool, job, oid).await;
        pool.shutdown_all();
        return result;
    }

    if args.once {
        run_pass(&pool, &jobs).await?;
        pool.shutdown_all();
        return Ok(());
    }

    let interval = args.interval.unwrap_or(config.poll_interval_seconds).max(1);
    tracing::info!("Polling every {} seconds", interval);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            tracing::error!("Cannot listen for shutdown signals: {}", e);
            // keep the sender alive so the poll loop is not stopped
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received, stopping after the current pass");
        let _ = shutdown_tx.send(true);
    });

    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        if let Err(e) = forward_reload_signals(reload_tx).await {
            tracing::error!("Cannot listen for reload signals: {}", e);
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(interval));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => run_pass(&pool, &jobs).await?,
            Some(()) = reload_rx.recv() => {
                tracing::info!("Clearing index caches on all workers");
                pool.clear_caches();
            }
            _ = shutdown_rx.changed() => break,
        }
    }

    pool.shutdown_all();
    tracing::info!("SNMP poller stopped");
    Ok(())
}

/// Poll every interface once and print one line per item.
async fn run_pass(pool: &WorkerPool, jobs: &[InterfaceJob]) -> anyhow::Result<()> {
    let started = std::time::Instant::now();
    let polls = jobs.iter().map(|job| pool.poll(job.clone()));
    let outcomes = join_all(polls).await;

    let mut items = 0;
    let mut failed = 0;
    for (job, outcome) in jobs.iter().zip(outcomes) {
        match outcome {
            Ok(results) => {
                for result in &results {
                    items += 1;
                    if result.error().is_some() {
                        failed += 1;
                    }
                    println!("{}", serde_json::to_string(&ItemLine::new(&job.id, result))?);
                }
            }
            Err(e) => tracing::error!("Polling interface {} failed: {}", job.id, e),
        }
    }

    tracing::info!(
        "Pass finished: {} items ({} failed) in {:?}",
        items,
        failed,
        started.elapsed()
    );
    Ok(())
}

async fn walk_once(pool: &WorkerPool, job: InterfaceJob, oid: String) -> anyhow::Result<()> {
    let interface = job.id.clone();
    let rows = pool
        .walk(job, oid.clone())
        .await?
        .with_context(|| format!("walking {} on {}", oid, interface))?;

    for (index, value) in rows {
        println!("{}", serde_json::json!({ "index": index, "value": value }));
    }
    Ok(())
}

/// Wait for SIGTERM or SIGINT shutdown signal.
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl+C");
    }

    Ok(())
}

/// Forward every SIGHUP to `reload_tx`; each one clears the index caches.
async fn forward_reload_signals(reload_tx: mpsc::UnboundedSender<()>) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sighup = signal(SignalKind::hangup())?;
        while sighup.recv().await.is_some() {
            tracing::info!("Received SIGHUP");
            if reload_tx.send(()).is_err() {
                break;
            }
        }
    }

    #[cfg(not(unix))]
    drop(reload_tx);

    Ok(())
}
