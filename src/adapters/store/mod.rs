//! Terminal report store adapters.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryReportStore;
pub use sqlite::SqliteReportStore;
