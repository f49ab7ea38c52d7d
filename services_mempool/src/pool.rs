//! Volatile memory pool implementation

use exec_types::{config, EsError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

/// Check-bit pattern marking a valid block descriptor
const CHECK_PATTERN: u16 = 0x5a5a;
/// Allocated-marker values distinguishing live from free blocks
const BLOCK_USED: u16 = 0xaaaa;
const BLOCK_FREE: u16 = 0xdddd;

/// In-buffer descriptor size: check bits, allocated marker, class size,
/// used size
const DESC_SIZE: usize = 12;

static POOL_COUNTER: AtomicU32 = AtomicU32::new(1);

/// Opaque handle to a pool block
///
/// Carries the owning pool's identity so a handle from one pool cannot
/// be redeemed against another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    pool_id: u32,
    offset: u32,
}

impl PoolHandle {
    /// Byte offset of the block descriptor within the pool buffer
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

/// Per-size-class usage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStats {
    pub block_size: usize,
    pub num_created: u32,
    pub num_free: u32,
}

/// Pool-wide usage statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub pool_size: usize,
    pub num_blocks_requested: u32,
    pub check_err_count: u32,
    pub num_free_bytes: usize,
    pub block_stats: Vec<BlockStats>,
}

#[derive(Debug, Clone, Copy)]
struct BlockDesc {
    check_bits: u16,
    allocated: u16,
    class_size: u32,
    used_size: u32,
}

impl BlockDesc {
    fn encode(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.check_bits.to_le_bytes());
        buf[2..4].copy_from_slice(&self.allocated.to_le_bytes());
        buf[4..8].copy_from_slice(&self.class_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.used_size.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            check_bits: u16::from_le_bytes([buf[0], buf[1]]),
            allocated: u16::from_le_bytes([buf[2], buf[3]]),
            class_size: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            used_size: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        }
    }
}

/// A volatile memory pool
///
/// Not internally locked; see `SharedMemPool` for the mutex-protected
/// variant. The unlocked form is for pools owned by a single task.
pub struct MemPool {
    pool_id: u32,
    buffer: Vec<u8>,
    size_table: Vec<usize>,
    free_lists: HashMap<usize, Vec<u32>>,
    high_water: usize,
    num_blocks_requested: u32,
    check_err_count: u32,
    created_per_class: HashMap<usize, u32>,
}

impl MemPool {
    /// Creates a pool with the default block-size table
    pub fn create(pool_size: usize) -> Result<Self, EsError> {
        Self::create_ex(pool_size, &config::MEM_POOL_DEFAULT_SIZES)
    }

    /// Creates a pool with a caller-supplied block-size table
    ///
    /// An empty table falls back to the defaults. Tables larger than
    /// the configured maximum cardinality are rejected.
    pub fn create_ex(pool_size: usize, size_table: &[usize]) -> Result<Self, EsError> {
        let table: &[usize] = if size_table.is_empty() {
            &config::MEM_POOL_DEFAULT_SIZES
        } else {
            size_table
        };
        if table.len() > config::MAX_BLOCK_SIZES {
            return Err(EsError::BadArgument(format!(
                "block size table has {} entries, max {}",
                table.len(),
                config::MAX_BLOCK_SIZES
            )));
        }
        if table.iter().any(|&s| s == 0) {
            return Err(EsError::BadArgument("zero block size in table".to_string()));
        }

        let mut sorted: Vec<usize> = table.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.dedup();

        let smallest = *sorted.last().unwrap_or(&0);
        if pool_size < smallest + DESC_SIZE {
            return Err(EsError::BadArgument(format!(
                "pool size {} below minimum {}",
                pool_size,
                smallest + DESC_SIZE
            )));
        }

        Ok(Self {
            pool_id: POOL_COUNTER.fetch_add(1, Ordering::Relaxed),
            buffer: vec![0u8; pool_size],
            size_table: sorted,
            free_lists: HashMap::new(),
            high_water: 0,
            num_blocks_requested: 0,
            check_err_count: 0,
            created_per_class: HashMap::new(),
        })
    }

    /// Smallest configured class that can hold `size` bytes
    fn class_for(&self, size: usize) -> Option<usize> {
        self.size_table
            .iter()
            .rev()
            .copied()
            .find(|&class| class >= size)
    }

    /// Allocates a block large enough for `size` bytes
    pub fn get_buf(&mut self, size: usize) -> Result<PoolHandle, EsError> {
        if size == 0 {
            return Err(EsError::ErrMemBlockSize);
        }
        let class = self.class_for(size).ok_or(EsError::ErrMemBlockSize)?;

        let offset = if let Some(offset) = self
            .free_lists
            .get_mut(&class)
            .and_then(|list| list.pop())
        {
            offset
        } else {
            let needed = DESC_SIZE + class;
            if self.high_water + needed > self.buffer.len() {
                return Err(EsError::ErrMemBlockSize);
            }
            let offset = self.high_water as u32;
            self.high_water += needed;
            *self.created_per_class.entry(class).or_insert(0) += 1;
            offset
        };

        let desc = BlockDesc {
            check_bits: CHECK_PATTERN,
            allocated: BLOCK_USED,
            class_size: class as u32,
            used_size: size as u32,
        };
        let at = offset as usize;
        desc.encode(&mut self.buffer[at..at + DESC_SIZE]);

        self.num_blocks_requested += 1;
        Ok(PoolHandle {
            pool_id: self.pool_id,
            offset,
        })
    }

    /// Reads back and validates the descriptor a handle points at
    fn validate(&mut self, handle: PoolHandle) -> Result<BlockDesc, EsError> {
        if handle.pool_id != self.pool_id {
            return Err(EsError::ErrMemHandle);
        }
        let at = handle.offset as usize;
        if at + DESC_SIZE > self.buffer.len() {
            return Err(EsError::ErrMemHandle);
        }
        let desc = BlockDesc::decode(&self.buffer[at..at + DESC_SIZE]);
        if desc.check_bits != CHECK_PATTERN
            || (desc.allocated != BLOCK_USED && desc.allocated != BLOCK_FREE)
            || !self.size_table.contains(&(desc.class_size as usize))
        {
            self.check_err_count += 1;
            return Err(EsError::ErrMemHandle);
        }
        Ok(desc)
    }

    /// Returns a block to its free list, yielding the block's class size
    pub fn put_buf(&mut self, handle: PoolHandle) -> Result<usize, EsError> {
        let desc = self.validate(handle)?;
        if desc.allocated != BLOCK_USED {
            self.check_err_count += 1;
            return Err(EsError::ErrMemHandle);
        }

        let freed = BlockDesc {
            allocated: BLOCK_FREE,
            used_size: 0,
            ..desc
        };
        let at = handle.offset as usize;
        freed.encode(&mut self.buffer[at..at + DESC_SIZE]);

        self.free_lists
            .entry(desc.class_size as usize)
            .or_default()
            .push(handle.offset);
        Ok(desc.class_size as usize)
    }

    /// Reports the class size of a live block without freeing it
    pub fn buf_info(&mut self, handle: PoolHandle) -> Result<usize, EsError> {
        let desc = self.validate(handle)?;
        if desc.allocated != BLOCK_USED {
            self.check_err_count += 1;
            return Err(EsError::ErrMemHandle);
        }
        Ok(desc.class_size as usize)
    }

    /// Copies payload bytes into a live block
    pub fn write_buf(&mut self, handle: PoolHandle, data: &[u8]) -> Result<(), EsError> {
        let desc = self.validate(handle)?;
        if desc.allocated != BLOCK_USED || data.len() > desc.class_size as usize {
            return Err(EsError::ErrMemHandle);
        }
        let start = handle.offset as usize + DESC_SIZE;
        self.buffer[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Copies payload bytes out of a live block
    pub fn read_buf(&mut self, handle: PoolHandle, buf: &mut [u8]) -> Result<(), EsError> {
        let desc = self.validate(handle)?;
        if desc.allocated != BLOCK_USED || buf.len() > desc.class_size as usize {
            return Err(EsError::ErrMemHandle);
        }
        let start = handle.offset as usize + DESC_SIZE;
        buf.copy_from_slice(&self.buffer[start..start + buf.len()]);
        Ok(())
    }

    /// Current usage statistics snapshot
    pub fn stats(&self) -> PoolStats {
        let block_stats = self
            .size_table
            .iter()
            .map(|&class| BlockStats {
                block_size: class,
                num_created: self.created_per_class.get(&class).copied().unwrap_or(0),
                num_free: self
                    .free_lists
                    .get(&class)
                    .map(|l| l.len() as u32)
                    .unwrap_or(0),
            })
            .collect();

        // A free-listed block's descriptor space is reusable too, so a
        // get/put round trip restores the accounting exactly.
        let free_from_lists: usize = self
            .free_lists
            .iter()
            .map(|(class, list)| (class + DESC_SIZE) * list.len())
            .sum();

        PoolStats {
            pool_size: self.buffer.len(),
            num_blocks_requested: self.num_blocks_requested,
            check_err_count: self.check_err_count,
            num_free_bytes: (self.buffer.len() - self.high_water) + free_from_lists,
            block_stats,
        }
    }

    /// Corrupts a descriptor byte, for validation tests
    #[cfg(test)]
    fn corrupt_descriptor(&mut self, handle: PoolHandle) {
        self.buffer[handle.offset as usize] ^= 0xff;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rejects_undersized_pool() {
        assert!(matches!(
            MemPool::create(4),
            Err(EsError::BadArgument(_))
        ));
    }

    #[test]
    fn test_create_ex_rejects_oversized_table() {
        let table = vec![8usize; config::MAX_BLOCK_SIZES + 1];
        assert!(MemPool::create_ex(1024, &table).is_err());
    }

    #[test]
    fn test_create_ex_empty_table_uses_defaults() {
        let mut pool = MemPool::create_ex(4096, &[]).unwrap();
        // Default table's smallest class is 8
        let handle = pool.get_buf(5).unwrap();
        assert_eq!(pool.buf_info(handle).unwrap(), 8);
    }

    #[test]
    fn test_get_put_restores_free_accounting() {
        let mut pool = MemPool::create(4096).unwrap();
        let before = pool.stats().num_free_bytes;

        let handle = pool.get_buf(100).unwrap();
        assert!(pool.stats().num_free_bytes < before);

        let freed = pool.put_buf(handle).unwrap();
        assert_eq!(freed, 128);
        assert_eq!(pool.stats().num_free_bytes, before);

        // A second allocation of the same class reuses the freed block
        let again = pool.get_buf(100).unwrap();
        assert_eq!(again.offset(), handle.offset());
    }

    #[test]
    fn test_zero_and_oversize_requests_rejected() {
        let mut pool = MemPool::create(4096).unwrap();
        assert_eq!(pool.get_buf(0), Err(EsError::ErrMemBlockSize));
        assert_eq!(pool.get_buf(1 << 20), Err(EsError::ErrMemBlockSize));
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut pool = MemPool::create_ex(2 * (64 + DESC_SIZE), &[64]).unwrap();
        pool.get_buf(64).unwrap();
        pool.get_buf(64).unwrap();
        assert_eq!(pool.get_buf(64), Err(EsError::ErrMemBlockSize));
    }

    #[test]
    fn test_handle_from_other_pool_rejected() {
        let mut a = MemPool::create(4096).unwrap();
        let mut b = MemPool::create(4096).unwrap();
        let handle = a.get_buf(32).unwrap();
        assert_eq!(b.put_buf(handle), Err(EsError::ErrMemHandle));
        // Still valid against the owning pool
        assert!(a.put_buf(handle).is_ok());
    }

    #[test]
    fn test_double_free_rejected() {
        let mut pool = MemPool::create(4096).unwrap();
        let handle = pool.get_buf(32).unwrap();
        pool.put_buf(handle).unwrap();
        assert_eq!(pool.put_buf(handle), Err(EsError::ErrMemHandle));
    }

    #[test]
    fn test_corrupted_descriptor_detected() {
        let mut pool = MemPool::create(4096).unwrap();
        let handle = pool.get_buf(32).unwrap();
        pool.corrupt_descriptor(handle);

        assert_eq!(pool.buf_info(handle), Err(EsError::ErrMemHandle));
        assert_eq!(pool.stats().check_err_count, 1);
    }

    #[test]
    fn test_payload_round_trip() {
        let mut pool = MemPool::create(4096).unwrap();
        let handle = pool.get_buf(16).unwrap();
        pool.write_buf(handle, b"telemetry packet").unwrap();

        let mut out = [0u8; 16];
        pool.read_buf(handle, &mut out).unwrap();
        assert_eq!(&out, b"telemetry packet");
    }

    #[test]
    fn test_stats_per_class_counts() {
        let mut pool = MemPool::create_ex(4096, &[256, 64]).unwrap();
        let h1 = pool.get_buf(10).unwrap();
        let _h2 = pool.get_buf(200).unwrap();
        pool.put_buf(h1).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.num_blocks_requested, 2);
        let c64 = stats.block_stats.iter().find(|b| b.block_size == 64).unwrap();
        assert_eq!(c64.num_created, 1);
        assert_eq!(c64.num_free, 1);
        let c256 = stats
            .block_stats
            .iter()
            .find(|b| b.block_size == 256)
            .unwrap();
        assert_eq!(c256.num_created, 1);
        assert_eq!(c256.num_free, 0);
    }
}
