//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and traits
//! to make it easier to get started with the library.

pub use crate::adapter::{OrmConnection, OrmDriver, RoutingConfig};
pub use crate::builder::{
    Comparison, Compilable, DatabaseConnection, Driver, QueryBuilder, SortOrder,
    TransactionSettings,
};
pub use crate::client::{OrmClient, RawExecutor, TransactionOptions};
pub use crate::compiled::{CompiledQuery, QueryNode, StatementKind};
pub use crate::error::{BridgeError, Capability, ErrorKind};
pub use crate::extension::{Extended, Extension};
pub use crate::replica::ReadReplicas;
pub use crate::results::{CustomDbRow, QueryResult, ResultSet};
pub use crate::types::{IsolationLevel, QueryAndParams, RowValues};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteClient, SqliteOptions, SqliteOptionsBuilder, SqliteTxClient};
