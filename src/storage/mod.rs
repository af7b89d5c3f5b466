//! Persistence layer
//!
//! Load/save of already-structured records: discovery caches and the
//! publisher identity file. Saves are atomic write-rename; load failures
//! never poison in-memory state.

pub mod cache;
