//! keyway-lib: dependency closure and content hashing over build target graphs
//!
//! This crate provides:
//! - `target`: target identifiers, rule types and nodes
//! - `graph`: the read-only target graph and its JSON manifest form
//! - `query`: file ownership, dependent closure and dependency-first traversal
//! - `rulekey`: memoized, parallel rule key computation
//! - `targethash`: target hashes for change detection
//! - `show`: per-target rule key / target hash results

pub mod config;
pub mod graph;
pub mod query;
pub mod rulekey;
pub mod show;
pub mod target;
pub mod targethash;
pub mod util;
