use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracekeeper::circuit_breaker::CircuitBreaker;
use tracekeeper::cli::{Cli, OutputFormat};
use tracekeeper::config::AgentConfig;
use tracekeeper::lifecycle::{LifecycleListener, TracerLifecycle, TracerState};
use tracekeeper::pool_factory::{FactoryStats, PoolFactory};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

/// Counts pause/resume transitions for the report
#[derive(Default)]
struct TransitionCounter {
    pauses: AtomicU64,
    resumes: AtomicU64,
}

impl LifecycleListener for TransitionCounter {
    fn pause(&self) -> Result<()> {
        self.pauses.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.resumes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Serialize)]
struct Report {
    final_state: TracerState,
    pauses: u64,
    resumes: u64,
    traced_units: u64,
    skipped_units: u64,
    monitors: Vec<String>,
    pools: FactoryStats,
}

fn load_config(args: &Cli) -> Result<AgentConfig> {
    let mut config = match &args.config {
        Some(path) => AgentConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AgentConfig::default(),
    };

    // The watcher exists to run the breaker
    config.circuit_breaker.enabled = true;
    if let Some(interval) = args.interval {
        config.circuit_breaker.stress_monitoring_interval_ms = interval;
    }
    if let Some(duration) = args.cpu_duration {
        config.circuit_breaker.cpu_duration_threshold_ms = duration;
    }
    if args.no_recording {
        config.recording = false;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// One simulated trace unit: a transaction with a span, recycled on completion
fn trace_unit(pools: &PoolFactory, n: u64) {
    let transactions = pools.transaction_pool();
    let spans = pools.span_pool();

    let mut tx = transactions.create_instance();
    tx.set_name_static("GET /health");
    tx.timestamp_nanos = n;

    let mut span = spans.create_instance();
    span.set_name_static("db:query");
    span.add_attribute_static("db.system", "sqlite".to_string());
    span.duration_nanos = 1_000;

    spans.recycle(span);
    transactions.recycle(tx);
}

fn print_text_report(report: &Report) {
    println!("=== Tracekeeper Report ===");
    println!("Final state:   {}", report.final_state);
    println!("Pauses:        {}", report.pauses);
    println!("Resumes:       {}", report.resumes);
    println!("Traced units:  {}", report.traced_units);
    println!("Skipped units: {}", report.skipped_units);
    println!();
    println!("Monitors:");
    for info in &report.monitors {
        println!("  {}", info);
    }
    println!();
    println!(
        "{:<16} {:>10} {:>10} {:>10} {:>10} {:>8}",
        "pool", "capacity", "available", "requested", "garbage", "hit %"
    );
    println!("─────────────────────────────────────────────────────────────────────");
    for (kind, stats) in report.pools.iter() {
        println!(
            "{:<16} {:>10} {:>10} {:>10} {:>10} {:>8.1}",
            kind,
            stats.capacity,
            stats.available,
            stats.requested,
            stats.garbage_created,
            stats.hit_rate()
        );
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = load_config(&args)?;

    let tracer = Arc::new(TracerLifecycle::new(config.recording));
    let transitions = Arc::new(TransitionCounter::default());
    tracer.add_listener(transitions.clone());

    let pools = PoolFactory::new(&config.pools);
    let breaker = CircuitBreaker::with_default_monitors(&config.circuit_breaker, tracer.clone());

    tracer.start();
    breaker
        .start()
        .context("Failed to spawn stress monitor poller")?;

    let deadline = Instant::now()
        .checked_add(Duration::from_secs(args.duration))
        .context("Watch duration is out of range")?;
    let pause = if args.load == 0 {
        Duration::from_millis(100)
    } else {
        Duration::from_micros(1_000_000 / args.load.max(1))
    };

    let mut traced_units = 0u64;
    let mut skipped_units = 0u64;
    while Instant::now() < deadline {
        if args.load > 0 && tracer.is_running() {
            trace_unit(&pools, traced_units);
            traced_units += 1;
        } else if args.load > 0 {
            skipped_units += 1;
        }
        thread::sleep(pause);
    }

    breaker.stop();
    tracer.stop();

    let report = Report {
        final_state: tracer.state(),
        pauses: transitions.pauses.load(Ordering::Relaxed),
        resumes: transitions.resumes.load(Ordering::Relaxed),
        traced_units,
        skipped_units,
        monitors: breaker.stress_detection_info(),
        pools: pools.stats(),
    };

    match args.format {
        OutputFormat::Text => print_text_report(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if let Err(e) = pools.check_all_recycled() {
        tracing::warn!("{}", e);
    }

    Ok(())
}
