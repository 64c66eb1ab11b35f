//! The coordinator: probes the source, partitions the work, owns every
//! worker thread, and is the single authority that decides whether a run
//! succeeded or failed.

use crate::chunk::chunk_count as compute_chunk_count;
use crate::config::Config;
use crate::error::{CancelToken, FatalError, FailureSink};
use crate::http::probe_content_length;
use crate::metadata::Metadata;
use crate::partition::{plan_partitions, trim};
use crate::queue::bounded;
use crate::storage::OutputFile;
use crate::worker::{range, writer::{self, WriterOutcome}};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Run lifecycle, named in the design: `Init -> Probing -> Running ->
/// {Succeeded, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Probing,
    Running,
    Succeeded,
    Failed,
}

/// Runs one download to completion (or fatal failure). `urls[0]` is probed
/// for `Content-Length`; worker `k` fetches from `urls[k % urls.len()]`.
pub fn run(cfg: &Config, urls: &[String], requested_concurrency: usize, destination: &Path) -> Result<RunState, FatalError> {
    let mut state = RunState::Init;
    if urls.is_empty() {
        return Err(FatalError::Configuration("no URLs given".to_string()));
    }

    state = RunState::Probing;
    tracing::debug!(?state, "probing content length");
    let content_length = probe_content_length(&urls[0], cfg.connect_timeout(), cfg.read_timeout())?;

    let n = clamp_concurrency(requested_concurrency.max(1), content_length, cfg.min_bytes_per_connection);
    if n > 1 {
        println!("Downloading using {n} connections...");
    } else {
        println!("Downloading...");
    }

    let chunk_count = compute_chunk_count(content_length, cfg.chunk_size);
    let metadata = Metadata::load_or_new(destination, chunk_count);
    let initial_remaining = metadata.chunks_remaining();
    let bitmap = Arc::new(metadata.snapshot_bitmap());

    let out = OutputFile::create_or_open(destination, content_length)
        .map_err(|e| FatalError::Configuration(e.to_string()))?;

    let partitions: Vec<_> = plan_partitions(chunk_count, n, content_length, cfg.chunk_size)
        .into_iter()
        .map(|p| trim(p, &bitmap, cfg.chunk_size))
        .collect();

    let (tx, rx) = bounded(cfg.queue_capacity);
    let cancel = CancelToken::new();
    let sink = FailureSink::new(cancel.clone());
    let run_done = Arc::new(AtomicBool::new(false));

    spawn_watchdog(Arc::clone(&run_done), sink.clone(), cfg.overall_run_timeout());

    state = RunState::Running;
    tracing::debug!(?state, n, chunk_count, "starting workers");

    let mut range_handles = Vec::with_capacity(n);
    for partition in partitions {
        let worker_id = partition.worker_id;
        let url = urls[worker_id % urls.len()].clone();
        let bitmap = Arc::clone(&bitmap);
        let tx = tx.clone();
        let cancel = cancel.clone();
        let cfg = cfg.clone();
        let worker_sink = sink.clone();
        range_handles.push(std::thread::spawn(move || {
            range::run(
                worker_id,
                &url,
                partition,
                &bitmap,
                content_length,
                tx,
                &cancel,
                &cfg,
                &worker_sink,
            )
        }));
    }
    // Only the worker threads' clones should keep the channel open; once
    // every worker finishes, the writer's receiver sees `Disconnected`.
    drop(tx);

    let writer_handle = {
        let destination = destination.to_path_buf();
        let cancel = cancel.clone();
        let cfg = cfg.clone();
        std::thread::spawn(move || writer::run(&destination, metadata, &out, rx, &cancel, &cfg))
    };

    let mut total_emitted = 0usize;
    for handle in range_handles {
        match handle.join() {
            Ok(Ok(emitted)) => total_emitted += emitted,
            // The worker already reported its failure to `sink` (and
            // triggered cancellation) before returning; nothing left to do.
            Ok(Err(())) => {}
            Err(_) => {
                sink.report(FatalError::Configuration("a range worker thread panicked".to_string()));
            }
        }
    }

    let writer_result = writer_handle.join();
    run_done.store(true, Ordering::Relaxed);

    let final_metadata = match writer_result {
        Ok(Ok(WriterOutcome::Completed(m))) => Some(m),
        Ok(Ok(WriterOutcome::Cancelled)) => None,
        Ok(Err(e)) => {
            sink.report(e);
            None
        }
        Err(_) => {
            sink.report(FatalError::Configuration("the writer thread panicked".to_string()));
            None
        }
    };

    if let Some(err) = sink.take() {
        eprintln!("{err}");
        eprintln!("Download failed.");
        return Err(err);
    }

    let final_metadata = match final_metadata {
        Some(m) => m,
        None => {
            // No error was ever reported, yet the writer didn't complete:
            // an internal inconsistency, not a data-loss bug, but it means
            // the success criteria in the design were not actually met.
            let err = FatalError::Configuration(
                "run ended without a reported error but the writer never completed".to_string(),
            );
            eprintln!("{err}");
            eprintln!("Download failed.");
            return Err(err);
        }
    };

    if total_emitted != initial_remaining {
        tracing::warn!(
            total_emitted,
            initial_remaining,
            "emitted chunk count does not match the initial bitmap's false bits"
        );
    }
    debug_assert!(final_metadata.is_complete());

    if let Err(e) = Metadata::remove(destination) {
        eprintln!("{e}");
        eprintln!("Download failed.");
        return Err(FatalError::Cleanup(e));
    }

    println!("Download succeeded.");
    Ok(RunState::Succeeded)
}

/// `N_effective = N_requested` unless each worker would get at most
/// `min_bytes_per_connection`, in which case it's clamped down to
/// `max(1, content_length / min_bytes_per_connection)`.
fn clamp_concurrency(requested: usize, content_length: u64, min_bytes_per_connection: u64) -> usize {
    if content_length / requested as u64 <= min_bytes_per_connection {
        ((content_length / min_bytes_per_connection) as usize).max(1)
    } else {
        requested
    }
}

fn spawn_watchdog(run_done: Arc<AtomicBool>, sink: FailureSink, overall_timeout: Duration) {
    std::thread::spawn(move || {
        let start = Instant::now();
        let tick = Duration::from_millis(200).min(overall_timeout.max(Duration::from_millis(1)));
        while !run_done.load(Ordering::Relaxed) {
            if start.elapsed() >= overall_timeout {
                sink.report(FatalError::OverallTimeout);
                return;
            }
            std::thread::sleep(tick);
        }
    });
}
