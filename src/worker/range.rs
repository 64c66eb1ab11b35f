//! Range worker: one HTTP range GET, split into chunks, skipping chunks
//! already marked done in the bitmap snapshot.

use crate::chunk::{chunk_len, chunk_offset, ChunkMessage};
use crate::config::Config;
use crate::error::{CancelToken, FailureSink, FatalError};
use crate::metadata::ChunkBitmap;
use crate::partition::WorkerPartition;
use crate::queue::ChunkSender;
use std::io;

/// Downloads `partition`'s byte range from `url`, emitting one `ChunkMessage`
/// per chunk not already set in `bitmap`. Returns the number of chunks
/// emitted (used to check the "total enqueued == initial false bits"
/// invariant). On any fatal condition, reports directly to `sink` — which
/// cancels the whole pool immediately — rather than letting the coordinator
/// learn about it only once this thread is joined.
pub fn run(
    worker_id: usize,
    url: &str,
    partition: WorkerPartition,
    bitmap: &ChunkBitmap,
    content_length: u64,
    tx: ChunkSender,
    cancel: &CancelToken,
    cfg: &Config,
    sink: &FailureSink,
) -> Result<usize, ()> {
    if partition.is_empty() {
        return Ok(0);
    }

    println!(
        "[{worker_id}] Start downloading range ({} - {}) from:\n{url}",
        partition.range_start, partition.range_end
    );

    let mut splitter = ChunkSplitter::new(
        bitmap,
        cfg.chunk_size,
        content_length,
        partition.start_chunk,
        partition.end_chunk,
        tx,
        cancel.clone(),
    );

    let mut easy = curl::easy::Easy::new();
    easy.url(url)
        .map_err(|e| fail(sink, worker_id, format!("invalid URL: {e}")))?;
    easy.follow_location(true)
        .map_err(|e| fail(sink, worker_id, e.to_string()))?;
    easy.connect_timeout(cfg.connect_timeout())
        .map_err(|e| fail(sink, worker_id, e.to_string()))?;
    easy.low_speed_limit(1)
        .map_err(|e| fail(sink, worker_id, e.to_string()))?;
    easy.low_speed_time(cfg.read_timeout())
        .map_err(|e| fail(sink, worker_id, e.to_string()))?;
    let range = format!("{}-{}", partition.range_start, partition.range_end);
    easy.range(&range)
        .map_err(|e| fail(sink, worker_id, e.to_string()))?;

    let mut write_error = false;
    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| match splitter.feed(data) {
                Ok(n) => Ok(n),
                Err(_) => Ok(0),
            })
            .map_err(|e| fail(sink, worker_id, e.to_string()))?;

        let perform_result = transfer.perform();
        drop(transfer);
        if let Err(e) = perform_result {
            if e.is_write_error() {
                write_error = true;
            } else {
                fail(sink, worker_id, e.to_string());
                return Err(());
            }
        }
    }
    if write_error {
        if let Some(err) = splitter.take_error() {
            fail(sink, worker_id, err.to_string());
            return Err(());
        }
    }

    let code = easy
        .response_code()
        .map_err(|e| fail(sink, worker_id, e.to_string()))?;
    if !(200..300).contains(&code) {
        fail(sink, worker_id, format!("range GET returned HTTP {code}"));
        return Err(());
    }

    if !splitter.is_fully_consumed() {
        fail(
            sink,
            worker_id,
            "short read: server closed before the full range arrived".to_string(),
        );
        return Err(());
    }

    println!("[{worker_id}] Finished downloading");
    Ok(splitter.emitted())
}

/// Reports a worker I/O failure to the shared sink, which latches the first
/// error and requests cancellation of every other worker immediately — not
/// deferred until the coordinator gets around to joining this thread.
fn fail(sink: &FailureSink, worker_id: usize, message: String) {
    sink.report(FatalError::WorkerIo {
        worker_id,
        source: anyhow::anyhow!(message),
    });
}

/// Feeds the raw byte stream from curl through chunk boundaries, discarding
/// bytes for chunks already marked done and enqueueing a `ChunkMessage` for
/// each fresh one. Curl delivers data in arbitrary-sized pushes that rarely
/// line up with chunk boundaries, so state (the in-progress chunk buffer and
/// how many bytes it still needs) is carried across `feed` calls.
struct ChunkSplitter<'a> {
    bitmap: &'a ChunkBitmap,
    chunk_size: u64,
    content_length: u64,
    cur_index: usize,
    end_index: usize,
    remaining_in_chunk: u64,
    skip_current: bool,
    buffer: Vec<u8>,
    tx: ChunkSender,
    cancel: CancelToken,
    emitted: usize,
    error: Option<io::Error>,
}

impl<'a> ChunkSplitter<'a> {
    fn new(
        bitmap: &'a ChunkBitmap,
        chunk_size: u64,
        content_length: u64,
        start_chunk: usize,
        end_chunk: usize,
        tx: ChunkSender,
        cancel: CancelToken,
    ) -> Self {
        let mut s = ChunkSplitter {
            bitmap,
            chunk_size,
            content_length,
            cur_index: start_chunk,
            end_index: end_chunk,
            remaining_in_chunk: 0,
            skip_current: false,
            buffer: Vec::new(),
            tx,
            cancel,
            emitted: 0,
            error: None,
        };
        s.begin_chunk();
        s
    }

    fn begin_chunk(&mut self) {
        if self.cur_index >= self.end_index {
            return;
        }
        self.remaining_in_chunk = chunk_len(self.cur_index, self.content_length, self.chunk_size);
        self.skip_current = self.bitmap.is_completed(self.cur_index);
        self.buffer = if self.skip_current {
            Vec::new()
        } else {
            Vec::with_capacity(self.remaining_in_chunk as usize)
        };
    }

    fn emitted(&self) -> usize {
        self.emitted
    }

    fn is_fully_consumed(&self) -> bool {
        self.cur_index >= self.end_index && self.remaining_in_chunk == 0
    }

    fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    /// Accepts `data`, returning the number of bytes consumed. Returning
    /// less than `data.len()` makes curl abort the transfer with a write
    /// error, which the caller distinguishes from a real I/O failure by
    /// checking `take_error`.
    fn feed(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut pos = 0;
        while pos < data.len() {
            if self.cancel.is_cancelled() {
                self.error = Some(io::Error::new(io::ErrorKind::Interrupted, "cancelled"));
                return Ok(pos);
            }
            if self.cur_index >= self.end_index {
                // Server sent more than the requested range; nothing left to do with it.
                break;
            }

            let take = (data.len() - pos).min(self.remaining_in_chunk as usize);
            if !self.skip_current {
                self.buffer.extend_from_slice(&data[pos..pos + take]);
            }
            self.remaining_in_chunk -= take as u64;
            pos += take;

            if self.remaining_in_chunk == 0 {
                if !self.skip_current {
                    let msg = ChunkMessage {
                        bytes: std::mem::take(&mut self.buffer),
                        file_offset: chunk_offset(self.cur_index, self.chunk_size),
                        chunk_index: self.cur_index,
                    };
                    if self.tx.enqueue(msg).is_err() {
                        self.error = Some(io::Error::new(
                            io::ErrorKind::BrokenPipe,
                            "writer is gone",
                        ));
                        return Ok(pos);
                    }
                    self.emitted += 1;
                }
                self.cur_index += 1;
                self.begin_chunk();
            }
        }
        Ok(pos)
    }
}
