pub mod memory;
pub mod sqlite;

pub use memory::MemoryEventStore;
pub use sqlite::SqliteEventStore;
