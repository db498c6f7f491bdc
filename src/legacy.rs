//! Legacy ring file fallback decoder.
//!
//! Ring files written before the `R1NG` binary layout are gzip streams whose
//! payload is a line-oriented JSON document carrying exactly three fields:
//! the device table, the partition shift, and the partition maps. The decoder
//! reconstructs those three fields into a fixed serde type; it is
//! deliberately not a general object-graph loader.

use serde::Deserialize;

use crate::device::Device;
use crate::error::{RingError, RingResult};
use crate::reader::RingReader;
use crate::ring::RingData;

#[derive(Debug, Deserialize)]
struct LegacyRing {
    devs: Vec<Option<Device>>,
    part_shift: u32,
    replica2part2dev_id: Vec<Vec<u16>>,
}

/// Decode a legacy ring document from a rewound reader.
pub(crate) fn decode(reader: &mut RingReader) -> RingResult<RingData> {
    let mut document = Vec::new();
    loop {
        let line = reader.readline()?;
        if line.is_empty() {
            break;
        }
        document.extend_from_slice(&line);
    }

    let legacy: LegacyRing = serde_json::from_slice(&document)
        .map_err(|e| RingError::corrupt(format!("legacy ring document: {e}")))?;
    if legacy.part_shift > 32 {
        return Err(RingError::corrupt(format!(
            "part_shift {} out of range",
            legacy.part_shift
        )));
    }

    Ok(RingData::new(
        legacy.replica2part2dev_id,
        legacy.devs,
        legacy.part_shift,
        None,
        None,
    ))
}
