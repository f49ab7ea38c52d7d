//! # Executive Types
//!
//! Shared identifiers, status codes, and platform limits for the
//! executive services workspace.
//!
//! ## Philosophy
//!
//! All cross-service state is identified by small integer handles into
//! fixed-capacity tables, never by raw pointers. Capacities are fixed at
//! build time so worst-case memory and scan time are known up front.

pub mod config;
pub mod error;
pub mod ids;
pub mod reset;

pub use error::EsError;
pub use ids::{AppId, LibId, TaskId};
pub use reset::{ExceptionAction, ResetSubtype, ResetType, SystemState};
