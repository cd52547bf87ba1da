//! Shared utilities.
//!
//! Digest types and file/directory content hashing.

pub mod hash;
