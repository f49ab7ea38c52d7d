//! Slot-indexed identifiers for system entities
//!
//! Applications, libraries, and tasks live in fixed-capacity tables; an
//! id is the slot index, valid only while the owning record is live.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for an application slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppId(u32);

impl AppId {
    /// Creates an app id from a table slot index
    pub fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Returns the table slot index
    pub fn index(&self) -> u32 {
        self.0
    }

    /// Returns the slot index as a usize, for table lookups
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "App({})", self.0)
    }
}

/// Identifier for a library slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LibId(u32);

impl LibId {
    /// Creates a library id from a table slot index
    pub fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Returns the table slot index
    pub fn index(&self) -> u32 {
        self.0
    }

    /// Returns the slot index as a usize, for table lookups
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LibId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lib({})", self.0)
    }
}

/// Identifier for an OS-level task slot
///
/// Main tasks and child tasks share the same table; the owning
/// application is recorded in the task record, not in the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(u32);

impl TaskId {
    /// Creates a task id from a table slot index
    pub fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Returns the table slot index
    pub fn index(&self) -> u32 {
        self.0
    }

    /// Returns the slot index as a usize, for table lookups
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_id_round_trip() {
        let id = AppId::from_index(7);
        assert_eq!(id.index(), 7);
        assert_eq!(id.as_usize(), 7);
    }

    #[test]
    fn test_task_id_display() {
        let id = TaskId::from_index(3);
        assert_eq!(format!("{}", id), "Task(3)");
    }

    #[test]
    fn test_ids_are_distinct_types() {
        let app = AppId::from_index(1);
        let other = AppId::from_index(2);
        assert_ne!(app, other);
    }
}
