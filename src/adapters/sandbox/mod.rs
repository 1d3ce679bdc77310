//! Sandbox provider adapters.

pub mod local;
pub mod memory;

pub use local::{LocalSandbox, LocalSandboxProvider};
pub use memory::{InMemorySandbox, InMemorySandboxProvider};
