//! Structured output extraction and command-line policy rewriting.
//!
//! The extractor never runs a process. It is handed the combined captured
//! text of a finished child together with its exit code.

pub mod blocks;
pub mod safe_mode;

pub use blocks::{extract_blocks, parse_captured, TagFilter};
pub use safe_mode::{apply_safe_mode, BYPASS_FLAG};
