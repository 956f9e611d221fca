// SQLite module - an ORM client backed by rusqlite and a bb8 pool
//
// - config: options, builder and the bb8 connection manager
// - params: bind value conversion
// - query: row extraction and blocking execution helpers
// - client: the pooled client and its interactive/batch transactions
// - transaction: the transaction-scoped client handle

pub mod config;
pub mod params;
pub mod query;

mod client;
mod transaction;

pub use client::SqliteClient;
pub use config::{SharedSqliteConnection, SqliteManager, SqliteOptions, SqliteOptionsBuilder};
pub use query::build_result_set;
pub use transaction::SqliteTxClient;
