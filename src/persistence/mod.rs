//! Persistence layer.
//!
//! Sessions are kept in memory and mirrored to a single JSON file that is
//! rewritten in full after every mutation.

pub mod session_store;
