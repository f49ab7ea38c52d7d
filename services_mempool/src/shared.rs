//! Mutex-protected pool wrapper
//!
//! The locked variant for pools shared between tasks. Lock poisoning
//! indicates deeper corruption; the operation proceeds best-effort on
//! the recovered guard rather than failing, and the event is counted.

use crate::{MemPool, PoolHandle, PoolStats};
use exec_types::EsError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// A memory pool protected by an internal mutex
pub struct SharedMemPool {
    inner: Mutex<MemPool>,
    lock_err_count: AtomicU32,
}

impl SharedMemPool {
    /// Creates a shared pool with the default block-size table
    pub fn create(pool_size: usize) -> Result<Self, EsError> {
        Ok(Self {
            inner: Mutex::new(MemPool::create(pool_size)?),
            lock_err_count: AtomicU32::new(0),
        })
    }

    /// Creates a shared pool with a caller-supplied block-size table
    pub fn create_ex(pool_size: usize, size_table: &[usize]) -> Result<Self, EsError> {
        Ok(Self {
            inner: Mutex::new(MemPool::create_ex(pool_size, size_table)?),
            lock_err_count: AtomicU32::new(0),
        })
    }

    fn with_pool<T>(&self, f: impl FnOnce(&mut MemPool) -> T) -> T {
        match self.inner.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => {
                self.lock_err_count.fetch_add(1, Ordering::Relaxed);
                f(&mut poisoned.into_inner())
            }
        }
    }

    pub fn get_buf(&self, size: usize) -> Result<PoolHandle, EsError> {
        self.with_pool(|p| p.get_buf(size))
    }

    pub fn put_buf(&self, handle: PoolHandle) -> Result<usize, EsError> {
        self.with_pool(|p| p.put_buf(handle))
    }

    pub fn buf_info(&self, handle: PoolHandle) -> Result<usize, EsError> {
        self.with_pool(|p| p.buf_info(handle))
    }

    pub fn write_buf(&self, handle: PoolHandle, data: &[u8]) -> Result<(), EsError> {
        self.with_pool(|p| p.write_buf(handle, data))
    }

    pub fn read_buf(&self, handle: PoolHandle, buf: &mut [u8]) -> Result<(), EsError> {
        self.with_pool(|p| p.read_buf(handle, buf))
    }

    pub fn stats(&self) -> PoolStats {
        self.with_pool(|p| p.stats())
    }

    /// Number of times a poisoned lock was recovered best-effort
    pub fn lock_err_count(&self) -> u32 {
        self.lock_err_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_pool_round_trip() {
        let pool = SharedMemPool::create(4096).unwrap();
        let handle = pool.get_buf(64).unwrap();
        pool.write_buf(handle, b"shared").unwrap();

        let mut out = [0u8; 6];
        pool.read_buf(handle, &mut out).unwrap();
        assert_eq!(&out, b"shared");

        assert_eq!(pool.put_buf(handle).unwrap(), 64);
        assert_eq!(pool.lock_err_count(), 0);
    }

    #[test]
    fn test_shared_pool_usable_across_threads() {
        let pool = std::sync::Arc::new(SharedMemPool::create(8192).unwrap());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            handles.push(std::thread::spawn(move || {
                let h = pool.get_buf(32).unwrap();
                pool.put_buf(h).unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pool.stats().num_blocks_requested, 4);
    }
}
