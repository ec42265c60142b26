//! Remote tree walker
//!
//! Flattens a remote directory tree into `FileDescriptor`s using a single
//! `RemoteSession`. Hashing happens in a later pass; see `hasher`.

pub mod tree;

pub use tree::{TreeWalker, WalkOutput, WalkProgress, WalkStats};
