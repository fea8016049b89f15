//! Persistence Module
//!
//! Durable snapshots of the query cache with timestamp revival on load.

mod revive;
mod snapshot;
mod storage;


pub use revive::{encode, encode_record, parse_timestamp, revive, RevivalMode, TIMESTAMP_TAG};
pub use snapshot::{PersistOptions, SnapshotPersister};
pub use storage::{DurableStore, FileStore, MemoryStore};
