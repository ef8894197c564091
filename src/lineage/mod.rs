//! Lineage records and the stores that hold them.
//!
//! - `record`: the per-alias state
//! - `store`: the compare-and-swap contract
//! - `memory` / `file`: in-process and durable implementations

pub mod file;
pub mod memory;
pub mod record;
pub mod store;

pub use file::FileLineageStore;
pub use memory::MemoryLineageStore;
pub use record::LineageRecord;
pub use store::{LineageStore, StoreError};
