//! Streaming decompressing reader for ring files.
//!
//! Presents a gzip-compressed file as a sequential decompressed byte stream
//! without materializing the whole content at once. While reading, the reader
//! maintains an MD5 digest over the compressed bytes it has consumed plus
//! running compressed/decompressed byte counters, so a load can attach
//! integrity and size metadata to the ring it produces.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use flate2::write::GzDecoder;
use tracing::debug;

use crate::error::{RingError, RingResult};

/// Compressed input is consumed from the underlying file in chunks of this size.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Incremental gzip reader with checksum and byte accounting.
///
/// The digest and counters reflect state as of the most recent read; once the
/// whole stream has been consumed, the digest covers the entire compressed
/// file.
pub struct RingReader {
    file: File,
    decoder: GzDecoder<Vec<u8>>,
    buffer: Vec<u8>,
    digest: md5::Context,
    compressed_len: u64,
    decompressed_len: u64,
    exhausted: bool,
}

impl RingReader {
    /// Open a ring file for streaming decompression.
    pub fn open(path: &Path) -> RingResult<Self> {
        let file = File::open(path)?;
        debug!(path = %path.display(), "opened ring file for reading");
        Ok(RingReader {
            file,
            decoder: GzDecoder::new(Vec::new()),
            buffer: Vec::new(),
            digest: md5::Context::new(),
            compressed_len: 0,
            decompressed_len: 0,
            exhausted: false,
        })
    }

    /// Pull one compressed chunk from the file, fold it into the digest and
    /// counters, and append its decompressed output to the buffer.
    ///
    /// Returns `false` once the underlying file is exhausted; refilling stops
    /// permanently at that point.
    fn buffer_chunk(&mut self) -> RingResult<bool> {
        if self.exhausted {
            return Ok(false);
        }

        let mut chunk = vec![0u8; CHUNK_SIZE];
        let n = self.file.read(&mut chunk)?;
        if n == 0 {
            if self.compressed_len > 0 {
                self.decoder
                    .try_finish()
                    .map_err(|e| RingError::corrupt(format!("gzip stream: {e}")))?;
                self.drain_decoded();
            }
            self.exhausted = true;
            return Ok(false);
        }

        let chunk = &chunk[..n];
        self.digest.consume(chunk);
        self.compressed_len += n as u64;
        self.decoder
            .write_all(chunk)
            .map_err(|e| RingError::corrupt(format!("gzip stream: {e}")))?;
        self.drain_decoded();
        Ok(true)
    }

    /// Move decompressed output from the decoder's sink into the read buffer.
    fn drain_decoded(&mut self) {
        let decoded = self.decoder.get_mut();
        if !decoded.is_empty() {
            self.decompressed_len += decoded.len() as u64;
            self.buffer.extend_from_slice(decoded);
            decoded.clear();
        }
    }

    /// Return exactly `amount` decompressed bytes, or fewer only if the
    /// underlying stream is exhausted first.
    pub fn read(&mut self, amount: usize) -> RingResult<Vec<u8>> {
        while self.buffer.len() < amount {
            if !self.buffer_chunk()? {
                break;
            }
        }
        let take = amount.min(self.buffer.len());
        Ok(self.buffer.drain(..take).collect())
    }

    /// Return the next decompressed bytes up through and including the next
    /// line terminator, or the remaining bytes if the stream ends first.
    pub fn readline(&mut self) -> RingResult<Vec<u8>> {
        loop {
            // Scan after every refill: the decoder may hold back output
            // until the final flush at end of stream, so the buffer can
            // gain bytes even on the refill that reports exhaustion.
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                return Ok(self.buffer.drain(..=pos).collect());
            }
            if self.exhausted {
                return Ok(std::mem::take(&mut self.buffer));
            }
            self.buffer_chunk()?;
        }
    }

    /// Rewind the reader to the start of the file.
    ///
    /// Resets the buffer, counters, digest, and decompressor. Any target
    /// other than offset 0 fails with [`RingError::UnsupportedSeek`].
    pub fn seek(&mut self, offset: u64) -> RingResult<()> {
        if offset != 0 {
            return Err(RingError::UnsupportedSeek { offset });
        }
        self.file.seek(SeekFrom::Start(0))?;
        self.decoder = GzDecoder::new(Vec::new());
        self.buffer.clear();
        self.digest = md5::Context::new();
        self.compressed_len = 0;
        self.decompressed_len = 0;
        self.exhausted = false;
        Ok(())
    }

    /// Hex MD5 digest of the compressed bytes consumed so far.
    pub fn md5_hex(&self) -> String {
        format!("{:x}", self.digest.clone().compute())
    }

    /// Number of compressed bytes consumed so far.
    pub fn compressed_len(&self) -> u64 {
        self.compressed_len
    }

    /// Number of decompressed bytes produced so far.
    pub fn decompressed_len(&self) -> u64 {
        self.decompressed_len
    }
}
