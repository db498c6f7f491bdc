//! Codec for partitioned consistent-hashing ring files.
//!
//! This crate loads and saves the binary, versioned, gzip-compressed on-disk
//! representation of device-placement tables used by a distributed storage
//! system:
//!
//! - [`RingData`]: device table + per-replica partition maps + partition
//!   shift, with load/save in the `R1NG` version-1 layout and a legacy
//!   fallback decoder
//! - [`RingReader`]: streaming gzip reader that tracks an MD5 digest and
//!   compressed/decompressed byte counters while it reads
//! - [`AtomicRingWriter`]: write-fsync-rename persistence so readers never
//!   observe a partial ring file
//! - [`RingByteChannel`]: whole-file byte exchange seam for external
//!   synchronization transports
//!
//! Ring placement (which partition goes on which device) is computed
//! elsewhere; this crate is only the codec for already-computed ring data.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod device;
pub mod error;
pub mod format;
mod legacy;
pub mod reader;
pub mod ring;
pub mod writer;

pub use channel::{FsByteChannel, RingByteChannel};
pub use device::{Device, DEFAULT_REGION};
pub use error::{RingError, RingResult};
pub use format::{
    ByteOrderTag, RingHeader, DEFAULT_RING_MTIME, RING_FORMAT_VERSION, RING_MAGIC,
};
pub use reader::{RingReader, CHUNK_SIZE};
pub use ring::{calc_replica_count, Provenance, RingData};
pub use writer::AtomicRingWriter;
