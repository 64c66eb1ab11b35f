//! Chunk geometry: the fixed-size accounting unit shared by the bitmap,
//! the range workers, and the writer.

/// Default chunk size used when the config doesn't override it (64 KiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 65_536;

/// Number of chunks needed to cover `content_length` bytes at `chunk_size`.
///
/// Only the final chunk may be shorter than `chunk_size`.
pub fn chunk_count(content_length: u64, chunk_size: u64) -> usize {
    if content_length == 0 {
        return 0;
    }
    ((content_length + chunk_size - 1) / chunk_size) as usize
}

/// Byte length of chunk `index` given the total `content_length`.
///
/// Every chunk is `chunk_size` bytes except possibly the last, which covers
/// whatever remains.
pub fn chunk_len(index: usize, content_length: u64, chunk_size: u64) -> u64 {
    let start = index as u64 * chunk_size;
    let end = (start + chunk_size).min(content_length);
    end.saturating_sub(start)
}

/// Byte offset of chunk `index` into the file.
pub fn chunk_offset(index: usize, chunk_size: u64) -> u64 {
    index as u64 * chunk_size
}

/// An immutable message moved from a range worker to the writer: the bytes
/// for one fresh chunk, its file offset, and its index in the bitmap.
pub struct ChunkMessage {
    pub bytes: Vec<u8>,
    pub file_offset: u64,
    pub chunk_index: usize,
}
