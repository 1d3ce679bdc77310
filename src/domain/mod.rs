//! Domain layer for the build orchestrator
//!
//! Core models, the error taxonomy and the ports that concrete sandbox,
//! agent and persistence adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{BuildError, BuildResult, ErrorKind};
