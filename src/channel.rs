//! Byte-channel seam for ring file synchronization.
//!
//! External collaborators (ledger transports, file watchers) exchange ring
//! files as complete byte buffers. This crate only provides the two
//! operations they need: read the exact current bytes of a saved ring file,
//! and overwrite a ring file with exact bytes without exposing a partial
//! file to concurrent readers. How the buffers travel is up to the caller.

use std::io;
use std::path::Path;

use crate::writer::AtomicRingWriter;

/// Whole-file byte exchange for ring files.
pub trait RingByteChannel {
    /// Read the exact current bytes of a saved ring file.
    fn fetch(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Overwrite a ring file with these exact bytes.
    ///
    /// Concurrent readers observe either the previous file or the new one in
    /// full, never a mixture.
    fn replace(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

/// Filesystem-backed byte channel.
pub struct FsByteChannel;

impl RingByteChannel for FsByteChannel {
    fn fetch(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn replace(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut writer = AtomicRingWriter::create(path)?;
        writer.write_all(bytes)?;
        writer.commit()
    }
}
