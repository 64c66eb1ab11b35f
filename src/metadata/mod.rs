//! Crash-safe side-car metadata: which chunks are durably on disk.
//!
//! The side-car lives at `<destination>.tmp` and is write-through: every
//! update is serialized to `<destination>.tmp1` and then atomically renamed
//! over `<destination>.tmp`, so a crash between writes never leaves a torn
//! file — the rename either lands or it doesn't.

mod bitmap;

pub use bitmap::ChunkBitmap;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Side-car suffix for the durable progress record.
pub const SIDECAR_SUFFIX: &str = ".tmp";
/// Suffix for the write-through scratch file, renamed over the side-car.
const SIDECAR_SCRATCH_SUFFIX: &str = ".tmp1";

/// On-disk representation of `Metadata`. Any format that round-trips these
/// three fields deterministically is acceptable; this crate uses JSON.
#[derive(Debug, Serialize, Deserialize)]
struct MetadataOnDisk {
    chunk_count: usize,
    chunks_done: usize,
    bitmap: Vec<u8>,
}

/// In-memory record of which fixed-size chunks of the destination file have
/// been durably written. Owned exclusively by the writer worker.
#[derive(Debug, Clone)]
pub struct Metadata {
    chunk_count: usize,
    chunks_done: usize,
    bitmap: ChunkBitmap,
}

impl Metadata {
    fn fresh(chunk_count: usize) -> Self {
        Metadata {
            chunk_count,
            chunks_done: 0,
            bitmap: ChunkBitmap::new(chunk_count),
        }
    }

    /// Side-car path for a given destination file.
    pub fn sidecar_path(destination: &Path) -> PathBuf {
        append_suffix(destination, SIDECAR_SUFFIX)
    }

    /// Loads the side-car at `<destination>.tmp` if it decodes into a
    /// well-formed record whose `chunk_count` matches; otherwise starts fresh.
    /// Decode failures are logged and treated as "no side-car".
    pub fn load_or_new(destination: &Path, chunk_count: usize) -> Self {
        let path = Self::sidecar_path(destination);
        match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<MetadataOnDisk>(&bytes) {
                Ok(on_disk) if on_disk.chunk_count == chunk_count => {
                    tracing::info!(
                        path = %path.display(),
                        chunks_done = on_disk.chunks_done,
                        chunk_count,
                        "resuming from side-car"
                    );
                    Metadata {
                        chunk_count,
                        chunks_done: on_disk.chunks_done,
                        bitmap: ChunkBitmap::from_bytes(&on_disk.bitmap, chunk_count),
                    }
                }
                Ok(on_disk) => {
                    tracing::warn!(
                        path = %path.display(),
                        on_disk_chunk_count = on_disk.chunk_count,
                        chunk_count,
                        "side-car chunk_count mismatch, starting fresh"
                    );
                    Self::fresh(chunk_count)
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "side-car decode failed, starting fresh");
                    Self::fresh(chunk_count)
                }
            },
            Err(_) => Self::fresh(chunk_count),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn chunks_done(&self) -> usize {
        self.chunks_done
    }

    pub fn chunks_remaining(&self) -> usize {
        self.chunk_count - self.chunks_done
    }

    /// Integer percent complete, truncated (not rounded) — `floor(100 * chunks_done / chunk_count)`.
    pub fn percent(&self) -> u64 {
        if self.chunk_count == 0 {
            return 100;
        }
        (100 * self.chunks_done as u64) / self.chunk_count as u64
    }

    pub fn is_complete(&self) -> bool {
        self.chunks_done == self.chunk_count
    }

    /// Marks chunk `index` as durably written. Caller must not call this
    /// twice for the same index; `chunks_done` is not idempotent.
    pub fn mark(&mut self, index: usize) {
        debug_assert!(
            !self.bitmap.is_completed(index),
            "mark() called twice for chunk {index}"
        );
        self.bitmap.set_completed(index);
        self.chunks_done += 1;
    }

    /// Immutable copy of the bitmap, published to range workers at startup.
    pub fn snapshot_bitmap(&self) -> ChunkBitmap {
        self.bitmap.clone()
    }

    /// Write-through: serialize to `<destination>.tmp1`, then atomically
    /// rename over `<destination>.tmp`. Rename failures are swallowed — the
    /// next successfully written chunk retries the whole persist.
    pub fn persist(&self, destination: &Path) {
        let scratch = append_suffix(destination, SIDECAR_SCRATCH_SUFFIX);
        let sidecar = Self::sidecar_path(destination);

        let on_disk = MetadataOnDisk {
            chunk_count: self.chunk_count,
            chunks_done: self.chunks_done,
            bitmap: self.bitmap.to_bytes(self.chunk_count),
        };

        let result = serde_json::to_vec(&on_disk)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| std::fs::write(&scratch, bytes).map_err(anyhow::Error::from))
            .and_then(|_| std::fs::rename(&scratch, &sidecar).map_err(anyhow::Error::from));

        if let Err(e) = result {
            tracing::warn!(error = %e, "metadata persist failed, will retry on next chunk");
        }
    }

    /// Deletes the side-car after a successful run. Fails only if the file
    /// is already absent — a fatal cleanup error per the caller's policy.
    pub fn remove(destination: &Path) -> std::io::Result<()> {
        std::fs::remove_file(Self::sidecar_path(destination))
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metadata_has_all_false_bitmap() {
        let m = Metadata::fresh(10);
        assert_eq!(m.chunks_done(), 0);
        assert_eq!(m.chunks_remaining(), 10);
        assert_eq!(m.percent(), 0);
        assert!(!m.is_complete());
    }

    #[test]
    fn mark_increments_chunks_done_and_sets_bit() {
        let mut m = Metadata::fresh(4);
        m.mark(1);
        m.mark(3);
        assert_eq!(m.chunks_done(), 2);
        assert!(m.snapshot_bitmap().is_completed(1));
        assert!(!m.snapshot_bitmap().is_completed(2));
    }

    #[test]
    fn percent_truncates() {
        let mut m = Metadata::fresh(3);
        m.mark(0);
        // 100 * 1 / 3 = 33.33 -> 33, truncated not rounded.
        assert_eq!(m.percent(), 33);
    }

    #[test]
    fn persist_then_load_or_new_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.iso");
        let mut m = Metadata::fresh(5);
        m.mark(0);
        m.mark(2);
        m.persist(&dest);

        assert!(!append_suffix(&dest, SIDECAR_SCRATCH_SUFFIX).exists());
        assert!(Metadata::sidecar_path(&dest).exists());

        let loaded = Metadata::load_or_new(&dest, 5);
        assert_eq!(loaded.chunks_done(), 2);
        assert!(loaded.snapshot_bitmap().is_completed(0));
        assert!(loaded.snapshot_bitmap().is_completed(2));
        assert!(!loaded.snapshot_bitmap().is_completed(1));
    }

    #[test]
    fn load_or_new_falls_back_fresh_on_chunk_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.iso");
        let mut m = Metadata::fresh(5);
        m.mark(0);
        m.persist(&dest);

        let loaded = Metadata::load_or_new(&dest, 10);
        assert_eq!(loaded.chunks_done(), 0);
        assert_eq!(loaded.chunk_count(), 10);
    }

    #[test]
    fn load_or_new_falls_back_fresh_on_corrupt_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.iso");
        std::fs::write(Metadata::sidecar_path(&dest), b"not json").unwrap();

        let loaded = Metadata::load_or_new(&dest, 5);
        assert_eq!(loaded.chunks_done(), 0);
    }

    #[test]
    fn remove_deletes_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.iso");
        let m = Metadata::fresh(2);
        m.persist(&dest);
        assert!(Metadata::sidecar_path(&dest).exists());
        Metadata::remove(&dest).unwrap();
        assert!(!Metadata::sidecar_path(&dest).exists());
    }

    #[test]
    fn remove_after_already_absent_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.iso");
        assert!(Metadata::remove(&dest).is_err());
    }

    #[test]
    fn sidecar_path_appends_dot_tmp() {
        let p = Metadata::sidecar_path(Path::new("/tmp/archive.zip"));
        assert_eq!(p.to_string_lossy(), "/tmp/archive.zip.tmp");
    }
}
