//! Bridge between an ORM client and a SQL query builder.
//!
//! An [`Extension`] attaches a query builder to an ORM client so both share one connection
//! pool. Statements built with the query builder run through the client's raw primitives
//! ([`RawExecutor`]), and inside the client's interactive transactions each callback receives
//! a query builder bound to that transaction.

pub mod adapter;
pub mod builder;
pub mod client;
pub mod compiled;
pub mod error;
pub mod extension;
pub mod prelude;
pub mod replica;
pub mod results;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod types;

#[cfg(test)]
mod test_support;

pub use adapter::{OrmConnection, OrmDriver, RoutingConfig};
pub use builder::QueryBuilder;
pub use client::{OrmClient, RawExecutor, TransactionOptions};
pub use compiled::{CompiledQuery, QueryNode, StatementKind};
pub use error::{BridgeError, Capability, ErrorKind};
pub use extension::{Extended, Extension};
pub use replica::ReadReplicas;
pub use results::{CustomDbRow, QueryResult, ResultSet};
pub use types::{IsolationLevel, QueryAndParams, RowValues};
