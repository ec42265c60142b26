//! Inventory model and persistence
//!
//! An inventory is the full set of files seen in one crawl pass, each with
//! its content hash. Inventories are written once and read back as
//! immutable input; re-hashing or resuming always produces a new one.
//!
//! Two interchangeable on-disk formats are supported:
//! - CSV: `path,name,size,permissions,md5,timestamp` with `#` metadata lines
//! - JSON: `{generated_at, total_files, files: [...]}`
//!
//! `store::load` accepts either, deciding by content shape.

mod document;
pub mod store;
mod tabular;
pub mod types;

pub use store::{
    format_instant, load, parse, parse_instant, render, save, save_all, InventoryFormat,
};
pub use types::{
    ContentHash, FileDescriptor, HashIndex, Inventory, UnhashedReason, ERROR_SENTINEL,
};
