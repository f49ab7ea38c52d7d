//! CDS block pool allocator
//!
//! Segregated free lists over the pool area of the persistent region.
//! Descriptors live in the region itself, ahead of each payload, so a
//! rebuild after a crash can walk the chain and reconstruct the free
//! lists without any volatile state.

use crate::layout::RegionLayout;
use exec_types::{config, EsError};
use psp_api::{PspApi, PspError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Check-bit pattern marking a valid persisted descriptor
const CHECK_PATTERN: u16 = 0x5a5a;
const BLOCK_USED: u16 = 0xaaaa;
const BLOCK_FREE: u16 = 0xdddd;

/// Persisted descriptor size: check bits, allocated marker, class size,
/// used size, payload CRC
pub(crate) const DESC_SIZE: usize = 16;

/// Handle to a CDS block: the region offset of its descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CdsHandle(pub u32);

#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockDesc {
    pub check_bits: u16,
    pub allocated: u16,
    pub class_size: u32,
    pub used_size: u32,
    pub crc: u32,
}

impl BlockDesc {
    fn encode(&self) -> [u8; DESC_SIZE] {
        let mut buf = [0u8; DESC_SIZE];
        buf[0..2].copy_from_slice(&self.check_bits.to_le_bytes());
        buf[2..4].copy_from_slice(&self.allocated.to_le_bytes());
        buf[4..8].copy_from_slice(&self.class_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.used_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.crc.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8; DESC_SIZE]) -> Self {
        Self {
            check_bits: u16::from_le_bytes([buf[0], buf[1]]),
            allocated: u16::from_le_bytes([buf[2], buf[3]]),
            class_size: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            used_size: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            crc: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        }
    }
}

fn media_err(err: PspError) -> EsError {
    EsError::CdsAccessError(err.to_string())
}

/// Volatile bookkeeping for the persistent block pool
pub struct CdsPool {
    layout: RegionLayout,
    size_table: Vec<usize>,
    free_lists: HashMap<usize, Vec<u32>>,
    high_water: usize,
}

impl CdsPool {
    /// Creates an empty pool over a freshly initialized region
    pub fn create(layout: RegionLayout) -> Result<Self, EsError> {
        let size_table: Vec<usize> = config::CDS_POOL_DEFAULT_SIZES.to_vec();
        let smallest = *size_table.last().unwrap_or(&0);
        if layout.pool_size() < smallest + DESC_SIZE {
            return Err(EsError::BadArgument(format!(
                "CDS pool area {} below minimum {}",
                layout.pool_size(),
                smallest + DESC_SIZE
            )));
        }
        Ok(Self {
            layout,
            size_table,
            free_lists: HashMap::new(),
            high_water: layout.pool_offset,
        })
    }

    /// Rebuilds pool bookkeeping by walking the persisted descriptor
    /// chain from the start of the pool area
    ///
    /// Stops at the first descriptor whose check bits do not match,
    /// which marks the high-water point of the previous incarnation.
    pub fn rebuild<P: PspApi>(layout: RegionLayout, psp: &mut P) -> Result<Self, EsError> {
        let mut pool = Self::create(layout)?;
        let mut offset = layout.pool_offset;

        while offset + DESC_SIZE <= layout.pool_end {
            let mut raw = [0u8; DESC_SIZE];
            psp.cds_read(offset, &mut raw).map_err(media_err)?;
            let desc = BlockDesc::decode(&raw);
            if desc.check_bits != CHECK_PATTERN {
                break;
            }
            let class = desc.class_size as usize;
            if !pool.size_table.contains(&class)
                || offset + DESC_SIZE + class > layout.pool_end
            {
                // Descriptor chain is self-inconsistent; the region
                // cannot be trusted past this point.
                return Err(EsError::CdsInvalid);
            }
            if desc.allocated == BLOCK_FREE {
                pool.free_lists.entry(class).or_default().push(offset as u32);
            } else if desc.allocated != BLOCK_USED {
                return Err(EsError::CdsInvalid);
            }
            offset += DESC_SIZE + class;
        }

        pool.high_water = offset;
        Ok(pool)
    }

    fn class_for(&self, size: usize) -> Option<usize> {
        self.size_table
            .iter()
            .rev()
            .copied()
            .find(|&class| class >= size)
    }

    /// Allocates a block for `size` payload bytes
    ///
    /// The descriptor is persisted before the handle is returned; the
    /// payload write is the caller's second phase.
    pub fn get_block<P: PspApi>(
        &mut self,
        psp: &mut P,
        size: usize,
    ) -> Result<CdsHandle, EsError> {
        if size == 0 || size > config::CDS_MAX_BLOCK_SIZE {
            return Err(EsError::ErrMemBlockSize);
        }
        let class = self.class_for(size).ok_or(EsError::ErrMemBlockSize)?;

        let offset = if let Some(offset) = self
            .free_lists
            .get_mut(&class)
            .and_then(|list| list.pop())
        {
            offset as usize
        } else {
            let needed = DESC_SIZE + class;
            if self.high_water + needed > self.layout.pool_end {
                return Err(EsError::ErrMemBlockSize);
            }
            let offset = self.high_water;
            self.high_water += needed;
            offset
        };

        let desc = BlockDesc {
            check_bits: CHECK_PATTERN,
            allocated: BLOCK_USED,
            class_size: class as u32,
            used_size: size as u32,
            crc: 0,
        };
        psp.cds_write(offset, &desc.encode()).map_err(media_err)?;
        Ok(CdsHandle(offset as u32))
    }

    /// Reads back and validates the descriptor a handle points at
    pub(crate) fn validate<P: PspApi>(
        &self,
        psp: &mut P,
        handle: CdsHandle,
    ) -> Result<BlockDesc, EsError> {
        let offset = handle.0 as usize;
        if offset < self.layout.pool_offset || offset + DESC_SIZE > self.layout.pool_end {
            return Err(EsError::ErrMemHandle);
        }
        let mut raw = [0u8; DESC_SIZE];
        psp.cds_read(offset, &mut raw).map_err(media_err)?;
        let desc = BlockDesc::decode(&raw);
        if desc.check_bits != CHECK_PATTERN
            || !self.size_table.contains(&(desc.class_size as usize))
            || desc.used_size > desc.class_size
        {
            return Err(EsError::ErrMemHandle);
        }
        Ok(desc)
    }

    /// Returns a block to its free list
    pub fn put_block<P: PspApi>(&mut self, psp: &mut P, handle: CdsHandle) -> Result<(), EsError> {
        let desc = self.validate(psp, handle)?;
        if desc.allocated != BLOCK_USED {
            return Err(EsError::ErrMemHandle);
        }

        let freed = BlockDesc {
            allocated: BLOCK_FREE,
            used_size: 0,
            crc: 0,
            ..desc
        };
        psp.cds_write(handle.0 as usize, &freed.encode())
            .map_err(media_err)?;
        self.free_lists
            .entry(desc.class_size as usize)
            .or_default()
            .push(handle.0);
        Ok(())
    }

    /// Writes a block payload, two-phase: descriptor (with the new
    /// CRC) first, payload second
    pub fn block_write<P: PspApi>(
        &mut self,
        psp: &mut P,
        handle: CdsHandle,
        data: &[u8],
    ) -> Result<(), EsError> {
        let desc = self.validate(psp, handle)?;
        if desc.allocated != BLOCK_USED {
            return Err(EsError::ErrMemHandle);
        }
        if data.len() != desc.used_size as usize {
            return Err(EsError::CdsInvalidSize);
        }

        let updated = BlockDesc {
            crc: crc32fast::hash(data),
            ..desc
        };
        let offset = handle.0 as usize;
        psp.cds_write(offset, &updated.encode()).map_err(media_err)?;
        psp.cds_write(offset + DESC_SIZE, data).map_err(media_err)?;
        Ok(())
    }

    /// Reads a block payload, verifying the stored CRC
    pub fn block_read<P: PspApi>(
        &mut self,
        psp: &mut P,
        handle: CdsHandle,
        buf: &mut [u8],
    ) -> Result<(), EsError> {
        let desc = self.validate(psp, handle)?;
        if desc.allocated != BLOCK_USED {
            return Err(EsError::ErrMemHandle);
        }
        if buf.len() != desc.used_size as usize {
            return Err(EsError::CdsInvalidSize);
        }

        let offset = handle.0 as usize;
        psp.cds_read(offset + DESC_SIZE, buf).map_err(media_err)?;
        if crc32fast::hash(buf) != desc.crc {
            return Err(EsError::CdsBlockCrc);
        }
        Ok(())
    }

    /// Free-list block count, for telemetry
    pub fn free_block_count(&self) -> usize {
        self.free_lists.values().map(|l| l.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psp_api::{FaultPolicy, FaultyCds, RamCds};

    fn test_pool() -> (CdsPool, RamCds) {
        let layout = RegionLayout::for_size(512 * 1024);
        let psp = RamCds::new(512 * 1024);
        (CdsPool::create(layout).unwrap(), psp)
    }

    #[test]
    fn test_create_rejects_tiny_region() {
        let layout = RegionLayout::for_size(32);
        assert!(CdsPool::create(layout).is_err());
    }

    #[test]
    fn test_get_rejects_zero_and_oversize() {
        let (mut pool, mut psp) = test_pool();
        assert_eq!(pool.get_block(&mut psp, 0), Err(EsError::ErrMemBlockSize));
        assert_eq!(
            pool.get_block(&mut psp, config::CDS_MAX_BLOCK_SIZE + 1),
            Err(EsError::ErrMemBlockSize)
        );
    }

    #[test]
    fn test_write_read_round_trip() {
        let (mut pool, mut psp) = test_pool();
        let handle = pool.get_block(&mut psp, 4).unwrap();
        pool.block_write(&mut psp, handle, b"data").unwrap();

        let mut out = [0u8; 4];
        pool.block_read(&mut psp, handle, &mut out).unwrap();
        assert_eq!(&out, b"data");
    }

    #[test]
    fn test_corrupted_payload_fails_crc() {
        let (mut pool, mut psp) = test_pool();
        let handle = pool.get_block(&mut psp, 4).unwrap();
        pool.block_write(&mut psp, handle, b"data").unwrap();

        // Flip one payload byte behind the pool's back
        let payload_at = handle.0 as usize + DESC_SIZE;
        psp.raw()[payload_at] ^= 0x01;

        let mut out = [0u8; 4];
        assert_eq!(
            pool.block_read(&mut psp, handle, &mut out),
            Err(EsError::CdsBlockCrc)
        );
    }

    #[test]
    fn test_put_then_get_reuses_block() {
        let (mut pool, mut psp) = test_pool();
        let first = pool.get_block(&mut psp, 100).unwrap();
        pool.put_block(&mut psp, first).unwrap();
        assert_eq!(pool.free_block_count(), 1);

        let second = pool.get_block(&mut psp, 100).unwrap();
        assert_eq!(first, second);
        assert_eq!(pool.free_block_count(), 0);
    }

    #[test]
    fn test_put_invalid_handle_rejected() {
        let (mut pool, mut psp) = test_pool();
        assert_eq!(
            pool.put_block(&mut psp, CdsHandle(0)),
            Err(EsError::ErrMemHandle)
        );
        assert_eq!(
            pool.put_block(&mut psp, CdsHandle(u32::MAX)),
            Err(EsError::ErrMemHandle)
        );
    }

    #[test]
    fn test_double_free_rejected() {
        let (mut pool, mut psp) = test_pool();
        let handle = pool.get_block(&mut psp, 16).unwrap();
        pool.put_block(&mut psp, handle).unwrap();
        assert_eq!(pool.put_block(&mut psp, handle), Err(EsError::ErrMemHandle));
    }

    #[test]
    fn test_media_fault_is_distinct_from_corruption() {
        let layout = RegionLayout::for_size(512 * 1024);
        let mut psp = FaultyCds::new(RamCds::new(512 * 1024));
        let mut pool = CdsPool::create(layout).unwrap();

        let handle = pool.get_block(&mut psp, 4).unwrap();
        pool.block_write(&mut psp, handle, b"data").unwrap();

        psp.set_read_policy(FaultPolicy::Always);
        let mut out = [0u8; 4];
        assert!(matches!(
            pool.block_read(&mut psp, handle, &mut out),
            Err(EsError::CdsAccessError(_))
        ));
    }

    #[test]
    fn test_rebuild_recovers_free_and_used_blocks() {
        let (mut pool, mut psp) = test_pool();
        let kept = pool.get_block(&mut psp, 32).unwrap();
        pool.block_write(&mut psp, kept, &[7u8; 32]).unwrap();
        let freed = pool.get_block(&mut psp, 64).unwrap();
        pool.put_block(&mut psp, freed).unwrap();

        // Volatile bookkeeping lost; rebuild from the region
        let layout = RegionLayout::for_size(512 * 1024);
        let mut rebuilt = CdsPool::rebuild(layout, &mut psp).unwrap();
        assert_eq!(rebuilt.free_block_count(), 1);

        let mut out = [0u8; 32];
        rebuilt.block_read(&mut psp, kept, &mut out).unwrap();
        assert_eq!(out, [7u8; 32]);

        // New allocations carve past the recovered high-water mark
        let fresh = rebuilt.get_block(&mut psp, 8).unwrap();
        assert!(fresh.0 > kept.0);
    }
}
