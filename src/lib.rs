#![forbid(unsafe_code)]

//! Launch and supervise external coding-agent CLI processes.
//!
//! Environment resolution, bounded process supervision with process-group
//! teardown, structured output extraction, session continuity, and
//! concurrent fan-out.

pub mod config;
pub mod environment;
pub mod errors;
pub mod extract;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod process;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
