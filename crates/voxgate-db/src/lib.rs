//! Database layer for voxgate.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization
//! and embedded SQL migrations. The only table the bridge owns is the
//! encrypted credential collection; its schema is created here.
//!
//! WAL mode allows concurrent readers with a single writer, which matches
//! the bridge's access pattern: every voice turn reads one row, writes only
//! happen when a user (re)configures their model.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
