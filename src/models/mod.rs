//! Domain model module declarations.

pub mod block;
pub mod model;
pub mod progress;
pub mod run;
pub mod session;
