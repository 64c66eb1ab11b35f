//! Writer worker: the single consumer that writes chunks to disk and
//! maintains the metadata side-car.

use crate::config::Config;
use crate::error::{CancelToken, FatalError};
use crate::metadata::Metadata;
use crate::queue::ChunkReceiver;
use crate::storage::OutputFile;
use std::path::Path;
use std::sync::mpsc::RecvTimeoutError;

/// How the writer's loop ended.
#[derive(Debug)]
pub enum WriterOutcome {
    /// Drained exactly the expected number of chunks; `Metadata` reflects
    /// the final, fully-written state.
    Completed(Metadata),
    /// Stopped early because the run was already cancelled by another
    /// worker's fatal error. Not itself a new error — the coordinator's
    /// failure sink already holds the real reason.
    Cancelled,
}

/// Runs the writer loop for exactly `metadata.chunks_remaining()` iterations
/// (fixed at entry), writing each dequeued chunk to `out`, marking it in
/// `metadata`, and persisting the side-car after every chunk.
pub fn run(
    destination: &Path,
    mut metadata: Metadata,
    out: &OutputFile,
    rx: ChunkReceiver,
    cancel: &CancelToken,
    cfg: &Config,
) -> Result<WriterOutcome, FatalError> {
    let expected = metadata.chunks_remaining();
    let mut received = 0usize;
    let mut last_percent = metadata.percent();

    while received < expected {
        if cancel.is_cancelled() {
            return Ok(WriterOutcome::Cancelled);
        }

        let msg = match rx.dequeue(cfg.writer_dequeue_timeout()) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) => return Err(FatalError::QueueTimeout),
            Err(RecvTimeoutError::Disconnected) => return Ok(WriterOutcome::Cancelled),
        };

        out.write_at(msg.file_offset, &msg.bytes)
            .map_err(FatalError::WriterIo)?;
        metadata.mark(msg.chunk_index);
        metadata.persist(destination);
        received += 1;

        let percent = metadata.percent();
        if percent > last_percent {
            println!("Downloaded {percent}%");
            last_percent = percent;
        }
    }

    Ok(WriterOutcome::Completed(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkMessage;
    use crate::queue::bounded;

    #[test]
    fn writer_drains_expected_count_and_marks_bitmap() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.bin");
        let out = OutputFile::create_or_open(&dest, 12).unwrap();
        let metadata = Metadata::load_or_new(&dest, 3);
        let (tx, rx) = bounded(4);
        let cancel = CancelToken::new();
        let cfg = Config::default();

        for i in 0..3usize {
            tx.enqueue(ChunkMessage {
                bytes: vec![b'a' + i as u8; 4],
                file_offset: (i * 4) as u64,
                chunk_index: i,
            })
            .unwrap();
        }
        drop(tx);

        let outcome = run(&dest, metadata, &out, rx, &cancel, &cfg).unwrap();
        match outcome {
            WriterOutcome::Completed(m) => {
                assert_eq!(m.chunks_done(), 3);
                assert!(m.is_complete());
            }
            WriterOutcome::Cancelled => panic!("expected completion"),
        }
    }

    #[test]
    fn writer_returns_cancelled_when_token_already_set() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.bin");
        let out = OutputFile::create_or_open(&dest, 4).unwrap();
        let metadata = Metadata::load_or_new(&dest, 1);
        let (_tx, rx) = bounded(1);
        let cancel = CancelToken::new();
        cancel.cancel();
        let cfg = Config::default();

        let outcome = run(&dest, metadata, &out, rx, &cancel, &cfg).unwrap();
        assert!(matches!(outcome, WriterOutcome::Cancelled));
    }

    #[test]
    fn writer_times_out_fatally_when_queue_stays_empty() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.bin");
        let out = OutputFile::create_or_open(&dest, 4).unwrap();
        let metadata = Metadata::load_or_new(&dest, 1);
        let (_tx_keep_alive, rx) = bounded(1);
        let cancel = CancelToken::new();
        let mut cfg = Config::default();
        cfg.writer_dequeue_timeout_secs = 0;

        let err = run(&dest, metadata, &out, rx, &cancel, &cfg).unwrap_err();
        assert!(matches!(err, FatalError::QueueTimeout));
    }

    #[test]
    fn zero_remaining_chunks_runs_zero_iterations() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.bin");
        let out = OutputFile::create_or_open(&dest, 4).unwrap();
        let mut metadata = Metadata::load_or_new(&dest, 1);
        metadata.mark(0);
        let (_tx, rx) = bounded(1);
        let cancel = CancelToken::new();
        let cfg = Config::default();

        let outcome = run(&dest, metadata, &out, rx, &cancel, &cfg).unwrap();
        match outcome {
            WriterOutcome::Completed(m) => assert!(m.is_complete()),
            WriterOutcome::Cancelled => panic!("expected completion"),
        }
    }
}
