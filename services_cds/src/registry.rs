//! CDS registry entry types

use crate::pool::CdsHandle;
use exec_types::config;
use serde::{Deserialize, Serialize};

/// One named persistent block
///
/// Names are dotted `Owner.Name` strings; the owner segment ties the
/// block to an application for the owner-active delete check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    pub handle: CdsHandle,
    pub size: usize,
    /// Set when the block backs a critical table rather than app data
    pub table: bool,
}

impl RegistryEntry {
    /// The `Owner` segment of the dotted name
    pub fn owner(&self) -> &str {
        self.name.split('.').next().unwrap_or("")
    }
}

/// Outcome of a successful `register` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A new block was allocated
    Created,
    /// The name existed with the same size; the existing block is
    /// returned untouched
    AlreadyExists,
    /// The name existed with a different size; the block was
    /// reallocated and prior contents discarded
    Resized,
}

/// Validates a dotted CDS name
pub fn validate_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= config::CDS_MAX_FULL_NAME_LEN
        && name.contains('.')
        && !name.starts_with('.')
        && !name.ends_with('.')
}

/// The persisted registry image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryImage {
    pub entries: Vec<RegistryEntry>,
}
