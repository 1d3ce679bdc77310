//! Infrastructure layer module
//!
//! Cross-cutting concerns the adapters and CLI share:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing) and secret scrubbing

pub mod config;
pub mod logging;
