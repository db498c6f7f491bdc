//! Partitioned consistent-hashing ring data and its on-disk codec.
//!
//! A ring maps every partition to one device per replica. The data itself is
//! three parallel structures: a device table, a partition shift, and one
//! partition map (array of 2-byte device ids) per replica. Loading sniffs the
//! format magic and falls back to the legacy decoder for older files; saving
//! always writes the current version-1 layout described in [`crate::format`].

use std::io::Write;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::{Compression, GzBuilder};
use tracing::debug;

use crate::device::Device;
use crate::error::{RingError, RingResult};
use crate::format::{
    ByteOrderTag, RingHeader, DEFAULT_RING_MTIME, RING_FORMAT_VERSION, RING_MAGIC,
};
use crate::legacy;
use crate::reader::RingReader;
use crate::writer::AtomicRingWriter;

/// Where a loaded ring came from: digest and byte counts of the source
/// stream. Derived metadata, not part of logical ring equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// Hex MD5 digest of the compressed source bytes
    pub md5: String,
    /// Compressed size of the source stream in bytes
    pub compressed_len: u64,
    /// Decompressed size of the source stream in bytes
    pub decompressed_len: u64,
}

/// Partitioned consistent-hashing ring data.
///
/// Immutable once built; construct it either in memory via [`RingData::new`]
/// or by decoding a stored file via [`RingData::load`].
#[derive(Debug, Clone)]
pub struct RingData {
    devs: Vec<Option<Device>>,
    replica2part2dev_id: Vec<Vec<u16>>,
    part_shift: u32,
    next_part_power: Option<u32>,
    version: Option<u64>,
    provenance: Option<Provenance>,
}

/// Number of replicas (full or partial) covered by a set of partition maps.
///
/// A final map shorter than the first models a replication tier that only
/// partially covers partitions: three full maps of 100 entries plus a final
/// map of 40 is a replica count of 3.4.
pub fn calc_replica_count(replica2part2dev_id: &[Vec<u16>]) -> f64 {
    if replica2part2dev_id.is_empty() {
        return 0.0;
    }
    let base = (replica2part2dev_id.len() - 1) as f64;
    let first = replica2part2dev_id[0].len();
    if first == 0 {
        return base;
    }
    let last = replica2part2dev_id[replica2part2dev_id.len() - 1].len();
    base + last as f64 / first as f64
}

impl RingData {
    /// Assemble ring data in memory.
    ///
    /// Every device record lacking a region is assigned the default region
    /// here, so the invariant holds for in-memory rings as well as loaded
    /// ones.
    ///
    /// # Panics
    ///
    /// Panics if `part_shift` exceeds 32; `partition_count` would be
    /// meaningless. Decoded rings are checked before construction and fail
    /// with [`RingError::Corrupt`] instead.
    pub fn new(
        replica2part2dev_id: Vec<Vec<u16>>,
        devs: Vec<Option<Device>>,
        part_shift: u32,
        next_part_power: Option<u32>,
        version: Option<u64>,
    ) -> Self {
        assert!(part_shift <= 32, "part_shift {part_shift} out of range");
        let mut ring = RingData {
            devs,
            replica2part2dev_id,
            part_shift,
            next_part_power,
            version,
            provenance: None,
        };
        ring.normalize_regions();
        ring
    }

    fn normalize_regions(&mut self) {
        for dev in self.devs.iter_mut().flatten() {
            dev.fill_default_region();
        }
    }

    /// Device table, with `None` for tombstoned slots.
    pub fn devs(&self) -> &[Option<Device>] {
        &self.devs
    }

    /// Partition maps, one per replica in replica order.
    pub fn replica2part2dev_id(&self) -> &[Vec<u16>] {
        &self.replica2part2dev_id
    }

    /// Partition shift.
    pub fn part_shift(&self) -> u32 {
        self.part_shift
    }

    /// Number of partitions per full map: `2^(32 - part_shift)`.
    pub fn partition_count(&self) -> u64 {
        1u64 << (32 - self.part_shift)
    }

    /// Partition power the ring is being resized to, if any.
    pub fn next_part_power(&self) -> Option<u32> {
        self.next_part_power
    }

    /// Opaque ring version tag, if any.
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Number of replicas, fractional when the final map is partial.
    pub fn replica_count(&self) -> f64 {
        calc_replica_count(&self.replica2part2dev_id)
    }

    /// Digest and byte counters of the source stream, present after a load.
    pub fn provenance(&self) -> Option<&Provenance> {
        self.provenance.as_ref()
    }

    /// Load ring data from a file.
    ///
    /// Sniffs the 4-byte magic: `R1NG` streams are decoded with the current
    /// version-1 layout, anything else is rewound and handed to the legacy
    /// fallback decoder. With `metadata_only` the partition maps are not
    /// read and the returned ring has an empty map set.
    pub fn load(path: &Path, metadata_only: bool) -> RingResult<RingData> {
        debug!(path = %path.display(), metadata_only, "loading ring file");
        let mut reader = RingReader::open(path)?;

        let magic = reader.read(4)?;
        let mut ring = if magic == RING_MAGIC {
            let version_bytes = reader.read(2)?;
            if version_bytes.len() < 2 {
                return Err(RingError::corrupt("truncated format version"));
            }
            let format_version = u16::from_be_bytes([version_bytes[0], version_bytes[1]]);
            if format_version != RING_FORMAT_VERSION {
                return Err(RingError::UnsupportedFormatVersion {
                    version: format_version,
                });
            }
            Self::deserialize_v1(&mut reader, metadata_only)?
        } else {
            reader.seek(0)?;
            legacy::decode(&mut reader)?
        };

        ring.provenance = Some(Provenance {
            md5: reader.md5_hex(),
            compressed_len: reader.compressed_len(),
            decompressed_len: reader.decompressed_len(),
        });
        Ok(ring)
    }

    /// Decode a version-1 ring body from a reader positioned just past the
    /// magic and format version.
    pub fn deserialize_v1(reader: &mut RingReader, metadata_only: bool) -> RingResult<RingData> {
        let len_bytes = reader.read(4)?;
        if len_bytes.len() < 4 {
            return Err(RingError::corrupt("truncated header length"));
        }
        let header_len =
            u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;

        let header_bytes = reader.read(header_len)?;
        if header_bytes.len() < header_len {
            return Err(RingError::corrupt(format!(
                "truncated header: expected {header_len} bytes, got {}",
                header_bytes.len()
            )));
        }
        let header = RingHeader::from_json_bytes(&header_bytes)?;
        if header.part_shift > 32 {
            return Err(RingError::corrupt(format!(
                "part_shift {} out of range",
                header.part_shift
            )));
        }

        let mut ring = RingData::new(
            Vec::new(),
            header.devs,
            header.part_shift,
            header.next_part_power,
            header.version,
        );
        if metadata_only {
            return Ok(ring);
        }

        let partition_count = (1u64 << (32 - header.part_shift)) as usize;
        let map_bytes = partition_count * 2;
        for replica in 0..header.replica_count {
            let raw = reader.read(map_bytes)?;
            let last = replica + 1 == header.replica_count;
            // Only the final map may be partial (fractional replica).
            if raw.len() < map_bytes && !last {
                return Err(RingError::corrupt(format!(
                    "partition map {replica}: expected {map_bytes} bytes, got {}",
                    raw.len()
                )));
            }
            if raw.is_empty() || raw.len() % 2 != 0 {
                return Err(RingError::corrupt(format!(
                    "partition map {replica}: truncated at {} bytes",
                    raw.len()
                )));
            }

            let mut map = vec![0u16; raw.len() / 2];
            match header.byteorder {
                ByteOrderTag::Big => BigEndian::read_u16_into(&raw, &mut map),
                ByteOrderTag::Little => LittleEndian::read_u16_into(&raw, &mut map),
            }
            ring.replica2part2dev_id.push(map);
        }

        Ok(ring)
    }

    /// Serialize the ring to the uncompressed version-1 byte layout.
    pub fn serialize_v1(&self) -> RingResult<Vec<u8>> {
        let header = RingHeader {
            byteorder: ByteOrderTag::CANONICAL,
            devs: self.devs.clone(),
            next_part_power: self.next_part_power,
            part_shift: self.part_shift,
            replica_count: self.replica2part2dev_id.len() as u32,
            version: self.version,
        };
        let header_json = header.to_json_bytes()?;

        let array_bytes: usize = self.replica2part2dev_id.iter().map(|m| m.len() * 2).sum();
        let mut out = Vec::with_capacity(10 + header_json.len() + array_bytes);
        out.extend_from_slice(&RING_MAGIC);
        out.extend_from_slice(&RING_FORMAT_VERSION.to_be_bytes());
        out.extend_from_slice(&(header_json.len() as u32).to_be_bytes());
        out.extend_from_slice(&header_json);

        for map in &self.replica2part2dev_id {
            let mut raw = vec![0u8; map.len() * 2];
            BigEndian::write_u16_into(map, &mut raw);
            out.extend_from_slice(&raw);
        }

        Ok(out)
    }

    /// Serialize this ring to disk with the default fixed gzip timestamp.
    pub fn save(&self, path: &Path) -> RingResult<()> {
        self.save_with_mtime(path, DEFAULT_RING_MTIME)
    }

    /// Serialize this ring to disk, embedding `mtime` in the gzip envelope.
    ///
    /// The same logical ring saved with the same mtime always produces
    /// byte-identical output. The file is published atomically via
    /// [`AtomicRingWriter`].
    pub fn save_with_mtime(&self, path: &Path, mtime: u32) -> RingResult<()> {
        debug!(path = %path.display(), "saving ring file");
        let payload = self.serialize_v1()?;

        let mut encoder = GzBuilder::new()
            .mtime(mtime)
            .write(Vec::new(), Compression::default());
        encoder.write_all(&payload)?;
        let compressed = encoder.finish()?;

        let mut writer = AtomicRingWriter::create(path)?;
        if let Err(e) = writer.write_all(&compressed) {
            let _ = writer.abort();
            return Err(e.into());
        }
        writer.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_dev(id: u64) -> Device {
        Device {
            id,
            region: Some(1),
            zone: id,
            ip: format!("10.0.0.{id}"),
            port: 6200,
            device: format!("sd{id}"),
            weight: 100.0,
            meta: String::new(),
        }
    }

    fn sample_ring() -> RingData {
        // part_shift 29 -> 8 partitions per full map
        RingData::new(
            vec![vec![0, 1, 2, 0, 1, 2, 0, 1], vec![2, 0, 1, 2, 0, 1, 2, 0]],
            vec![
                Some(sample_dev(0)),
                Some(sample_dev(1)),
                None,
                Some(sample_dev(3)),
            ],
            29,
            None,
            Some(4),
        )
    }

    #[test]
    fn test_partition_count() {
        assert_eq!(sample_ring().partition_count(), 8);
    }

    #[test]
    fn test_calc_replica_count_full_maps() {
        let maps = vec![vec![0u16; 100], vec![0u16; 100], vec![0u16; 100]];
        assert_eq!(calc_replica_count(&maps), 3.0);
    }

    #[test]
    fn test_calc_replica_count_fractional() {
        let maps = vec![
            vec![0u16; 100],
            vec![0u16; 100],
            vec![0u16; 100],
            vec![0u16; 40],
        ];
        assert_eq!(calc_replica_count(&maps), 3.4);
    }

    #[test]
    fn test_calc_replica_count_empty() {
        assert_eq!(calc_replica_count(&[]), 0.0);
    }

    #[test]
    #[should_panic(expected = "part_shift 33 out of range")]
    fn test_new_rejects_oversized_part_shift() {
        RingData::new(vec![], vec![], 33, None, None);
    }

    #[test]
    fn test_new_fills_default_region() {
        let mut dev = sample_dev(0);
        dev.region = None;
        let ring = RingData::new(vec![], vec![Some(dev), None], 30, None, None);
        assert_eq!(ring.devs()[0].as_ref().unwrap().region, Some(1));
        assert!(ring.devs()[1].is_none());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("object.ring.gz");
        let ring = sample_ring();

        ring.save(&path).unwrap();
        let loaded = RingData::load(&path, false).unwrap();

        assert_eq!(loaded.devs(), ring.devs());
        assert_eq!(loaded.replica2part2dev_id(), ring.replica2part2dev_id());
        assert_eq!(loaded.part_shift(), ring.part_shift());
        assert_eq!(loaded.version(), Some(4));
        assert_eq!(loaded.next_part_power(), None);
    }

    #[test]
    fn test_load_attaches_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("object.ring.gz");
        sample_ring().save(&path).unwrap();

        let loaded = RingData::load(&path, false).unwrap();
        let provenance = loaded.provenance().unwrap();

        let compressed = std::fs::read(&path).unwrap();
        assert_eq!(provenance.compressed_len, compressed.len() as u64);
        assert_eq!(provenance.md5, format!("{:x}", md5::compute(&compressed)));
        assert!(provenance.decompressed_len > 0);
    }

    #[test]
    fn test_save_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let ring = sample_ring();

        let a = dir.path().join("a.ring.gz");
        let b = dir.path().join("b.ring.gz");
        ring.save(&a).unwrap();
        ring.save(&b).unwrap();

        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn test_serialize_v1_layout() {
        let bytes = sample_ring().serialize_v1().unwrap();

        assert_eq!(&bytes[0..4], b"R1NG");
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 1);
        let header_len =
            u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
        let header = RingHeader::from_json_bytes(&bytes[10..10 + header_len]).unwrap();
        assert_eq!(header.replica_count, 2);
        assert_eq!(header.byteorder, ByteOrderTag::Big);
        // 2 maps x 8 partitions x 2 bytes
        assert_eq!(bytes.len(), 10 + header_len + 32);
    }

    proptest! {
        #[test]
        fn prop_roundtrip_preserves_maps(
            part_shift in 27u32..=30,
            replicas in 1usize..4,
            seed in any::<u16>(),
        ) {
            let partition_count = 1usize << (32 - part_shift);
            let maps: Vec<Vec<u16>> = (0..replicas)
                .map(|r| {
                    (0..partition_count)
                        .map(|p| seed.wrapping_add((r * partition_count + p) as u16))
                        .collect()
                })
                .collect();
            let ring = RingData::new(maps, vec![Some(sample_dev(0))], part_shift, None, None);

            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("prop.ring.gz");
            ring.save(&path).unwrap();
            let loaded = RingData::load(&path, false).unwrap();

            prop_assert_eq!(loaded.replica2part2dev_id(), ring.replica2part2dev_id());
            prop_assert_eq!(loaded.part_shift(), part_shift);
        }
    }
}
