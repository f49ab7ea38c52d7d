//! # OS Abstraction API
//!
//! This crate defines the interface between the executive services and
//! the underlying real-time operating system.
//!
//! ## Philosophy
//!
//! The executive never calls the OS directly; everything goes through
//! the `OsApi` trait so the same service code runs against a real RTOS
//! binding or the simulated OS used by tests.
//!
//! ## Non-Goals
//!
//! This is NOT a general-purpose OS portability layer. It carries only
//! the primitives the executive consumes: tasks, binary semaphores,
//! files, loadable modules, and a millisecond clock.

pub mod error;
pub mod os;

pub use error::OsError;
pub use os::{FileHandle, FileMode, ModuleId, OsApi, SemHandle, SymbolAddr};
