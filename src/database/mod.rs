//! Database pool management and migrations.

pub mod pool;

pub use pool::{create_pool, run_migrations, DatabaseError};
