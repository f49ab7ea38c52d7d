//! # Critical Data Store Service
//!
//! Fault-tolerant persistent storage over the platform's raw CDS
//! region: a recoverable block allocator plus a named registry mapping
//! dotted `Owner.Name` strings to persistent blocks.
//!
//! ## Crash Consistency Model
//!
//! The region has no filesystem underneath it, so consistency comes
//! from self-describing state rather than a transaction log:
//! - Begin/end sentinel markers bracket the region; a mismatch on boot
//!   means the region is not ours (power-on, corruption) and triggers
//!   rebuild or re-initialization.
//! - Every block carries a persisted descriptor (check bits, sizes,
//!   payload CRC) written *before* the payload. A crash between the two
//!   phases leaves a descriptor whose CRC disagrees with the payload,
//!   which the next read reports as `CdsBlockCrc` instead of returning
//!   stale bytes.
//! - The registry image is rewritten after every registration change;
//!   in-memory state mutates only after the durable write succeeds, so
//!   registration and deletion are atomic from the caller's view.

mod layout;
mod manager;
mod pool;
mod registry;

pub use layout::RegionLayout;
pub use manager::{CdsAvailability, CdsManager};
pub use pool::{CdsHandle, CdsPool};
pub use registry::{RegisterOutcome, RegistryEntry};
