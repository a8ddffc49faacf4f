//! SQLite persistence adapters.

pub mod connection;
pub mod event_store;
pub mod migrations;

pub use connection::{create_pool, create_test_pool, verify_connection, ConnectionError, PoolConfig};
pub use event_store::{OpenError, SqliteEventStore};
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
