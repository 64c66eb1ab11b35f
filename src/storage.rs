//! The output file handle: a positionable writable file at the destination
//! path, accepting writes at arbitrary offsets from the writer worker.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// The destination file. Mutated only by the writer worker; no locking is
/// needed beyond the bounded queue's own synchronization.
pub struct OutputFile {
    file: File,
}

impl OutputFile {
    /// Opens (creating if needed, without truncating, so a resumed run keeps
    /// its existing bytes) the file at `path` and preallocates it to
    /// `content_length` bytes.
    pub fn create_or_open(path: &Path, content_length: u64) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .with_context(|| format!("failed to open destination file: {}", path.display()))?;

        let out = OutputFile { file };
        out.preallocate(content_length)?;
        Ok(out)
    }

    /// Preallocates to `size` bytes. On Unix tries `posix_fallocate` for real
    /// block allocation; falls back to `set_len` on failure or non-Unix.
    /// A no-op if the file is already at least `size` bytes.
    fn preallocate(&self, size: u64) -> Result<()> {
        if self.file.metadata().map(|m| m.len()).unwrap_or(0) >= size {
            return Ok(());
        }

        #[cfg(unix)]
        {
            let fd = self.file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        self.file
            .set_len(size)
            .context("failed to preallocate destination file")?;
        Ok(())
    }

    /// Writes `data` at `offset` without disturbing the file's logical cursor.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.file
            .write_at(data, offset)
            .context("destination write failed")?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = self.file.try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)?;
        Ok(())
    }
}
