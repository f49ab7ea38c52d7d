//! # Platform Support API
//!
//! The seam between the executive and the board support layer: access
//! to the persistent Critical Data Store region, reset classification,
//! restart/panic triggers, and the pending-exception queue.
//!
//! Exceptions are delivered asynchronously by the platform and drained
//! by a polling scan in the lifecycle manager, bounding where state
//! mutation can occur.

pub mod error;
pub mod faulty;
pub mod platform;
pub mod ram_cds;

pub use error::PspError;
pub use faulty::{FaultPolicy, FaultyCds};
pub use platform::{ExceptionInfo, PspApi, RestartRequest};
pub use ram_cds::RamCds;
