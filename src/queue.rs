//! The bounded producer/consumer queue of chunk messages between range
//! workers and the writer.
//!
//! A thin wrapper over `std::sync::mpsc::sync_channel`: `enqueue` blocks
//! when the queue is full (back-pressuring producers), `dequeue` blocks with
//! a timeout when empty. Capacity bounds memory at `capacity * chunk_size`
//! worst-case and is otherwise independent of chunk size.

use crate::chunk::ChunkMessage;
use std::sync::mpsc::{self, RecvTimeoutError, SendError};
use std::time::Duration;

#[derive(Clone)]
pub struct ChunkSender(mpsc::SyncSender<ChunkMessage>);

pub struct ChunkReceiver(mpsc::Receiver<ChunkMessage>);

/// Creates a bounded multi-producer/single-consumer channel of capacity `Q`.
pub fn bounded(capacity: usize) -> (ChunkSender, ChunkReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (ChunkSender(tx), ChunkReceiver(rx))
}

impl ChunkSender {
    /// Blocks until there is room in the queue, or returns an error if the
    /// writer has already dropped its receiver (fatal: the writer is gone).
    pub fn enqueue(&self, msg: ChunkMessage) -> Result<(), SendError<ChunkMessage>> {
        self.0.send(msg)
    }
}

impl ChunkReceiver {
    /// Blocks until a chunk is available or `timeout` elapses. A timeout is
    /// fatal per the writer's contract; the caller maps it accordingly.
    pub fn dequeue(&self, timeout: Duration) -> Result<ChunkMessage, RecvTimeoutError> {
        self.0.recv_timeout(timeout)
    }
}
