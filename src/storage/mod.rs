pub mod memory;
pub mod postgres;
pub mod sqlite;
pub mod trait_def;

mod rows;

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{AnalyticsReader, AnalyticsStore, LinkStore, StorageError, StorageResult};
