//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Garbage collection: drops entries that went unread for their gc time
//! - Persistence: flushes the cache to its durable slot after mutations

mod gc;
mod persist;

pub use gc::spawn_gc_task;
pub use persist::{flush_snapshot, spawn_persist_task};
