//! Concrete collaborators behind the domain ports.

pub mod agents;
pub mod sandbox;
pub mod sqlite;
pub mod store;
