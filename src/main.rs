use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Args;
use hopwatch::config::Config;
use hopwatch::export::{write_csv_header, write_csv_rows};
use hopwatch::probe::IcmpProber;
use hopwatch::stats::HopStats;
use hopwatch::trace::{HopStatus, TraceEngine};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hopwatch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Probe for socket permissions early, with actionable guidance
    let prober = match IcmpProber::new() {
        Ok(prober) => Arc::new(prober),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let config = Config::from(&args);
    let engine = Arc::new(TraceEngine::new(config, prober)?);

    println!(
        "Tracing route to {} (max {} hops)...",
        args.target, args.max_hops
    );
    let route = engine
        .discover()
        .await
        .with_context(|| format!("Failed to discover route to {}", args.target))?;

    for hop in route.iter() {
        let note = match hop.status {
            HopStatus::Reached => "  <- destination",
            HopStatus::Failed => "  (probe failed)",
            _ => "",
        };
        println!("{:3}  {}{}", hop.ordinal, hop.label(), note);
    }
    println!();

    // Ctrl+C raises the engine's cancellation signal; the in-flight cycle
    // completes before the loop exits
    let ctrlc_engine = engine.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrlc_engine.stop();
    });

    // Console view: printed synchronously on each cycle-complete notification
    let cycles = Arc::new(AtomicU64::new(0));
    let console_engine = engine.clone();
    let console_cycles = cycles.clone();
    let count = args.count;
    let percentiles = args.percentiles;
    engine.subscribe(move || {
        let cycle = console_cycles.fetch_add(1, Ordering::SeqCst) + 1;
        print_cycle(&console_engine.snapshot_console(), cycle, percentiles);
        if count > 0 && cycle >= count {
            console_engine.stop();
        }
    });

    let monitor_handle = engine.start()?;

    // Persisted view: flushed to CSV on its own cadence, cleared after each
    // successful flush
    let csv_task = args.csv.clone().map(|path| {
        let flush_engine = engine.clone();
        let flush_cancel = CancellationToken::new();
        let cancel = flush_cancel.clone();
        let interval = args.csv_interval_duration();
        let task = tokio::spawn(async move {
            if let Err(e) = run_csv_flush(flush_engine, path, interval, cancel).await {
                error!(error = %e, "CSV flush task failed");
            }
        });
        (task, flush_cancel)
    });

    monitor_handle.await.ok();

    if let Some((task, cancel)) = csv_task {
        cancel.cancel();
        task.await.ok();
    }

    Ok(())
}

fn print_cycle(stats: &[HopStats], cycle: u64, percentiles: bool) {
    println!("Cycle {}", cycle);
    for tracker in stats {
        let addr = match tracker.addr {
            Some(ip) => ip.to_string(),
            None => "*".to_string(),
        };

        if tracker.received() > 0 {
            let mut line = format!(
                "{:3}  {:15}  {:28}  {:5.1}% loss  last {:7.2}ms  avg {:7.2}ms  jit {:6.2}ms",
                tracker.ordinal,
                addr,
                tracker.hostname,
                tracker.loss_pct(),
                tracker.last_rtt.as_secs_f64() * 1000.0,
                tracker.avg_rtt().as_secs_f64() * 1000.0,
                tracker.avg_jitter().as_secs_f64() * 1000.0,
            );
            if percentiles {
                let p98 = tracker.rtt_percentile(0.98);
                if !p98.is_zero() {
                    line.push_str(&format!("  p98 {:7.2}ms", p98.as_secs_f64() * 1000.0));
                }
            }
            println!("{}", line);
        } else {
            println!(
                "{:3}  {:15}  {:28}  {:5.1}% loss",
                tracker.ordinal,
                addr,
                tracker.hostname,
                tracker.loss_pct()
            );
        }
    }
    println!("---");
}

/// Periodically append the persisted view to a CSV file, clearing the view
/// after each successful flush so the next window starts fresh
async fn run_csv_flush(
    engine: Arc<TraceEngine>,
    path: PathBuf,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    if file.metadata()?.len() == 0 {
        write_csv_header(&mut file)?;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                flush_snapshot(&engine, &mut file)?;
                break;
            }
            _ = tokio::time::sleep(interval) => {
                flush_snapshot(&engine, &mut file)?;
            }
        }
    }

    Ok(())
}

fn flush_snapshot(engine: &TraceEngine, file: &mut std::fs::File) -> Result<()> {
    let snapshot = engine.snapshot_persisted();
    if snapshot.iter().all(|t| t.sent == 0) {
        return Ok(());
    }
    write_csv_rows(&snapshot, Utc::now(), &mut *file)?;
    file.flush()?;
    engine.clear_persisted();
    Ok(())
}
