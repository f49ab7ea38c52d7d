//! # Generic Memory Pool Service
//!
//! Bounded-block allocation over a caller-sized volatile buffer.
//!
//! ## Philosophy
//!
//! The pool never returns raw pointers: callers hold opaque handles
//! (byte offsets tagged with the owning pool's identity) and copy data
//! in and out through the pool. Every block carries an in-buffer
//! descriptor with a check-bit pattern and an allocated marker, and the
//! descriptor is validated before it is trusted — a handle minted
//! against a different pool, or a descriptor scribbled over by a stray
//! write, is reported as `ErrMemHandle` instead of being dereferenced.
//!
//! Allocation walks a descending table of size classes and picks the
//! smallest class that fits; freed blocks go onto a per-class free list
//! and are reused before new space is carved from the high-water mark.

mod pool;
mod shared;

pub use pool::{BlockStats, MemPool, PoolHandle, PoolStats};
pub use shared::SharedMemPool;
