//! Orchat Memory - thread and message persistence
//!
//! This crate provides the storage collaborator used by the conversation
//! orchestrator: a `ThreadStore` trait with an in-process implementation
//! and a SurrealDB-backed implementation.

pub mod storage;
pub mod surreal;

pub use storage::{MemoryThreadStore, NewThread, ThreadStore};
pub use surreal::{SurrealConfig, SurrealThreadStore};

// Re-export from orchat-common for convenience
pub use orchat_common::{ChatError, Result};
