//! Device records referenced by ring partition maps.
//!
//! A ring's device table is an ordered list of slots. A slot is either a
//! `Device` or empty (`None`) for a device that was removed; partition maps
//! keep referring to slots by index, so removed devices leave a hole rather
//! than shifting the table.

use serde::{Deserialize, Serialize};

/// Region assigned to devices that do not record one.
pub const DEFAULT_REGION: u64 = 1;

/// A single storage device participating in the ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Slot index of this device in the ring's device table
    pub id: u64,

    /// Failure-domain region. Older rings omit this; it is filled with
    /// [`DEFAULT_REGION`] when the ring is constructed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<u64>,

    /// Failure-domain zone within the region
    pub zone: u64,

    /// Network address of the storage server holding the device
    pub ip: String,

    /// Port of the storage server holding the device
    pub port: u16,

    /// Device name on the storage server (e.g. a mount point basename)
    pub device: String,

    /// Relative placement weight
    pub weight: f64,

    /// Free-form operator metadata
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub meta: String,
}

impl Device {
    /// Fill in the default region if none was recorded.
    pub(crate) fn fill_default_region(&mut self) {
        self.region.get_or_insert(DEFAULT_REGION);
    }
}
