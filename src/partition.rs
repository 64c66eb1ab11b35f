//! Worker partitioning and resume-aware trimming.
//!
//! Splits the chunk range `[0, chunk_count)` across `N` workers and advances
//! each worker's start past any already-downloaded prefix before dispatch.

use crate::chunk::chunk_offset;
use crate::metadata::ChunkBitmap;

/// One worker's share of the file: a contiguous run of chunk indices and the
/// matching inclusive byte range to request over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPartition {
    pub worker_id: usize,
    /// First chunk index this worker owns (after trimming).
    pub start_chunk: usize,
    /// One past the last chunk index this worker owns.
    pub end_chunk: usize,
    /// Inclusive start byte for the Range header.
    pub range_start: u64,
    /// Inclusive end byte for the Range header.
    pub range_end: u64,
    pub is_last_worker: bool,
}

impl WorkerPartition {
    /// Number of chunks this worker is still responsible for emitting.
    pub fn chunk_count(&self) -> usize {
        self.end_chunk.saturating_sub(self.start_chunk)
    }

    /// True when trimming consumed the worker's whole range; no connection
    /// should be opened.
    pub fn is_empty(&self) -> bool {
        self.start_chunk >= self.end_chunk || self.range_start >= self.range_end
    }
}

/// Builds the untrimmed per-worker chunk ranges: worker `k` of `n` owns
/// `[k * chunks_per_worker, (k+1) * chunks_per_worker)`, except the last
/// worker, which owns through `chunk_count - 1`.
pub fn plan_partitions(
    chunk_count: usize,
    n: usize,
    content_length: u64,
    chunk_size: u64,
) -> Vec<WorkerPartition> {
    if chunk_count == 0 || n == 0 {
        return Vec::new();
    }

    let chunks_per_worker = chunk_count / n;
    let mut out = Vec::with_capacity(n);

    for k in 0..n {
        let is_last_worker = k == n - 1;
        let start_chunk = k * chunks_per_worker;
        let end_chunk = if is_last_worker {
            chunk_count
        } else {
            (k + 1) * chunks_per_worker
        };

        let range_start = chunk_offset(start_chunk, chunk_size);
        let range_end = if is_last_worker {
            content_length.saturating_sub(1)
        } else {
            chunk_offset(end_chunk, chunk_size).saturating_sub(1)
        };

        out.push(WorkerPartition {
            worker_id: k,
            start_chunk,
            end_chunk,
            range_start,
            range_end,
            is_last_worker,
        });
    }

    out
}

/// Advances `partition`'s effective start over any prefix of chunks already
/// marked done in `bitmap`. Trimming is prefix-only: it stops at the first
/// unset bit (or the end of the worker's range), leaving interior holes for
/// the worker itself to skip while streaming.
pub fn trim(partition: WorkerPartition, bitmap: &ChunkBitmap, chunk_size: u64) -> WorkerPartition {
    let mut start_chunk = partition.start_chunk;
    while start_chunk < partition.end_chunk && bitmap.is_completed(start_chunk) {
        start_chunk += 1;
    }

    if start_chunk == partition.start_chunk {
        return partition;
    }

    let range_start = chunk_offset(start_chunk, chunk_size);
    WorkerPartition {
        start_chunk,
        range_start,
        ..partition
    }
}
