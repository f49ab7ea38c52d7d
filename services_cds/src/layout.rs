//! Persistent region layout
//!
//! ```text
//! +----------+-----------+------------------+------------------+----------+
//! | _CDSBeg_ | image len | registry image   | block pool       | _CDSEnd_ |
//! | 8 bytes  | 4 bytes   | size/4 bytes     | remainder        | 8 bytes  |
//! +----------+-----------+------------------+------------------+----------+
//! ```

/// Sentinel at offset 0
pub const BEGIN_SENTINEL: &[u8; 8] = b"_CDSBeg_";
/// Sentinel at offset size-8
pub const END_SENTINEL: &[u8; 8] = b"_CDSEnd_";

const SENTINEL_LEN: usize = 8;
const IMAGE_LEN_FIELD: usize = 4;

/// Byte offsets of the fixed region areas, derived from the region size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLayout {
    pub region_size: usize,
    pub registry_offset: usize,
    pub registry_capacity: usize,
    pub pool_offset: usize,
    pub pool_end: usize,
}

impl RegionLayout {
    /// Computes the layout for a region of `region_size` bytes
    ///
    /// A quarter of the region is reserved for the registry image; the
    /// remainder between the registry and the end sentinel is the pool.
    pub fn for_size(region_size: usize) -> Self {
        let registry_offset = SENTINEL_LEN + IMAGE_LEN_FIELD;
        let registry_capacity = region_size / 4;
        let pool_offset = registry_offset + registry_capacity;
        let pool_end = region_size.saturating_sub(SENTINEL_LEN);
        Self {
            region_size,
            registry_offset,
            registry_capacity,
            pool_offset,
            pool_end,
        }
    }

    /// Offset of the image length field
    pub fn image_len_offset(&self) -> usize {
        SENTINEL_LEN
    }

    /// Offset of the end sentinel
    pub fn end_sentinel_offset(&self) -> usize {
        self.region_size - SENTINEL_LEN
    }

    /// Usable pool bytes
    pub fn pool_size(&self) -> usize {
        self.pool_end.saturating_sub(self.pool_offset)
    }
}
