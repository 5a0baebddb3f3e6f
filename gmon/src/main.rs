//! # gmon - Main Entry Point
//!
//! Startup order: preflight checks -> metrics server -> symbol table ->
//! eBPF load and uprobe attach -> reader and reporter threads. Shutdown is
//! signal-driven and walks the same order backwards: the reader stops and
//! closes the channel, the reporter drains, the probes detach, the eBPF
//! object unloads.
//!
//! ## Typical Usage
//!
//! ```bash
//! sudo gmon --path /usr/bin/etcd
//! sudo gmon --path /usr/bin/dockerd --pid 1234 --level DEBUG
//! sudo gmon --path ./server --monitor-expiry-threshold 5m
//! ```

use anyhow::{Context, Result};
use aya::maps::{RingBuf, StackTraceMap};
use clap::Parser;
use crossbeam_channel::bounded;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gmon::cli::Args;
use gmon::domain::Pid;
use gmon::metrics::Metrics;
use gmon::monitoring::{
    attach_goroutine_uprobes, detach_goroutine_uprobes, load_ebpf_program, EventReader, Reporter,
    StackResolver, EVENT_QUEUE_CAPACITY,
};
use gmon::symbolization::SymbolTable;
use gmon::{preflight, server, trace_pipe};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = args.level_filter();
    env_logger::Builder::new().filter_level(level).init();

    preflight::run_preflight_checks(&args.path)?;
    if args.pid > 0 {
        preflight::check_process_exists(args.pid)?;
    }

    // Uprobe attachment and /proc matching need the real path
    let target_path = std::fs::canonicalize(&args.path)
        .context(format!("Failed to resolve path: {}", args.path))?
        .to_string_lossy()
        .to_string();

    let metrics = Arc::new(Metrics::new().context("Failed to build metrics registry")?);
    tokio::spawn(server::serve_metrics(metrics.clone(), server::metrics_addr(args.metrics)));
    if args.pprof > 1023 {
        tokio::spawn(server::serve_metrics(metrics.clone(), server::pprof_addr(args.pprof)));
    }

    // Checks the Go version gate as a side effect
    let symbols = SymbolTable::load(&target_path)
        .context(format!("Failed to load symbols from {target_path}"))?;

    let mut bpf = load_ebpf_program(&args.bpf_object)?;
    let links =
        attach_goroutine_uprobes(&mut bpf, &symbols, &target_path, Pid(args.pid).filter())?;

    let ring = RingBuf::try_from(bpf.take_map("EVENTS").context("EVENTS map not found")?)?;
    let stack_traces = StackTraceMap::try_from(
        bpf.take_map("STACK_ADDRESSES").context("STACK_ADDRESSES map not found")?,
    )?;

    let shutdown = Arc::new(AtomicBool::new(false));
    if level == log::LevelFilter::Debug {
        trace_pipe::spawn_mirror(shutdown.clone());
    }

    let (event_tx, event_rx) = bounded(EVENT_QUEUE_CAPACITY);
    let reader =
        EventReader::new(ring, StackResolver::new(symbols, stack_traces), event_tx, shutdown.clone());
    let reader_handle = std::thread::spawn(move || reader.run());

    let reporter = Reporter::new(event_rx, metrics.clone(), args.expiry_threshold());
    let reporter_handle = std::thread::spawn(move || reporter.run());

    info!("gmon monitors goroutines of {target_path}");

    wait_for_shutdown().await?;
    info!("received shutdown signal");

    // Stop the reader first; dropping its channel end is what tells the
    // reporter to drain and stop.
    shutdown.store(true, Ordering::Relaxed);
    if reader_handle.join().is_err() {
        warn!("event reader thread panicked");
    }
    if reporter_handle.join().is_err() {
        warn!("reporter thread panicked");
    }

    detach_goroutine_uprobes(&mut bpf, links);
    drop(bpf);
    debug!("gmon exits");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}
