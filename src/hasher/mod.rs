//! Resilient content hashing
//!
//! - `digest`: chunked MD5 accumulation
//! - `resilient`: per-file probe / download / retry state machine
//! - `pass`: the sequential batch with scheduled reconnects, carry-over and
//!   checkpoints

pub mod digest;
pub mod pass;
pub mod resilient;

pub use digest::{md5_hex, DEFAULT_CHUNK_SIZE};
pub use pass::{HashPass, HashProgress, HashRun, HashSummary};
pub use resilient::{hash_file, AttemptState, FileOutcome};
