//! SQLite plumbing shared by the persistent adapters.

pub mod connection;
pub mod migrations;

pub use connection::{create_pool, create_test_pool, ConnectionError};
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
