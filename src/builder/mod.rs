//! A compact SQLite-dialect query builder that executes through a pluggable [`Driver`].
//!
//! It compiles statements to [`CompiledQuery`] values and hands them to a connection acquired
//! from its driver. Paired with [`OrmDriver`](crate::adapter::OrmDriver) it runs every statement
//! through an ORM client.

mod driver;
mod statement;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub use driver::{DatabaseConnection, Driver, QueryStream, TransactionSettings};
pub use statement::{
    Comparison, Compilable, DeleteQuery, InsertQuery, RawQuery, SelectQuery, SortOrder,
    UpdateQuery,
};

use crate::compiled::CompiledQuery;
use crate::error::BridgeError;
use crate::results::QueryResult;
use crate::types::RowValues;

/// Entry point for building and running statements.
///
/// Cheap to clone; clones share the driver. A builder handed to a [`transaction`] callback is
/// pinned to the connection the transaction was opened on.
///
/// [`transaction`]: QueryBuilder::transaction
#[derive(Clone)]
pub struct QueryBuilder {
    driver: Arc<dyn Driver>,
    pinned: Option<Arc<dyn DatabaseConnection>>,
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("driver", &"<Driver>")
            .field("pinned", &self.pinned.is_some())
            .finish()
    }
}

impl QueryBuilder {
    pub fn new(driver: impl Driver + 'static) -> Self {
        Self {
            driver: Arc::new(driver),
            pinned: None,
        }
    }

    #[must_use]
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    #[must_use]
    pub fn select_from(&self, table: &str) -> SelectQuery<'_> {
        SelectQuery::new(self, table)
    }

    #[must_use]
    pub fn insert_into(&self, table: &str) -> InsertQuery<'_> {
        InsertQuery::new(self, table)
    }

    #[must_use]
    pub fn update_table(&self, table: &str) -> UpdateQuery<'_> {
        UpdateQuery::new(self, table)
    }

    #[must_use]
    pub fn delete_from(&self, table: &str) -> DeleteQuery<'_> {
        DeleteQuery::new(self, table)
    }

    /// Hand-written SQL with positional `?` parameters.
    #[must_use]
    pub fn raw(&self, sql: &str, params: Vec<RowValues>) -> RawQuery<'_> {
        RawQuery::new(self, sql, params)
    }

    /// Run a compiled statement on a connection from the driver.
    ///
    /// # Errors
    /// Returns the driver's acquire/release failures or the connection's execution failure.
    pub async fn execute_query(&self, compiled: &CompiledQuery) -> Result<QueryResult, BridgeError> {
        if let Some(conn) = &self.pinned {
            return conn.execute_query(compiled).await;
        }
        let conn = self.driver.acquire_connection().await?;
        let result = conn.execute_query(compiled).await;
        let released = self.driver.release_connection(conn).await;
        let result = result?;
        released?;
        Ok(result)
    }

    /// Stream a compiled statement's rows in chunks.
    ///
    /// # Errors
    /// Returns the connection's refusal when it cannot stream.
    pub async fn stream(
        &self,
        compiled: &CompiledQuery,
        chunk_size: usize,
    ) -> Result<QueryStream, BridgeError> {
        if let Some(conn) = &self.pinned {
            return conn.stream_query(compiled, chunk_size);
        }
        let conn = self.driver.acquire_connection().await?;
        let stream = conn.stream_query(compiled, chunk_size);
        self.driver.release_connection(conn).await?;
        stream
    }

    /// Run `f` inside a transaction opened through the driver.
    ///
    /// # Errors
    /// Returns the driver's begin/commit failure or `f`'s own failure (after rolling back).
    pub async fn transaction<T, F, Fut>(
        &self,
        settings: TransactionSettings,
        f: F,
    ) -> Result<T, BridgeError>
    where
        F: FnOnce(QueryBuilder) -> Fut,
        Fut: Future<Output = Result<T, BridgeError>>,
    {
        let conn = self.driver.acquire_connection().await?;
        if let Err(err) = self.driver.begin_transaction(conn.as_ref(), &settings).await {
            self.driver.release_connection(conn).await?;
            return Err(err);
        }

        let scoped = QueryBuilder {
            driver: Arc::clone(&self.driver),
            pinned: Some(Arc::clone(&conn)),
        };
        let outcome = match f(scoped).await {
            Ok(value) => self
                .driver
                .commit_transaction(conn.as_ref())
                .await
                .map(|()| value),
            Err(err) => {
                if let Err(rollback_err) = self.driver.rollback_transaction(conn.as_ref()).await {
                    tracing::warn!(error = %rollback_err, "query builder rollback failed");
                }
                Err(err)
            }
        };
        self.driver.release_connection(conn).await?;
        outcome
    }

    /// Tear down the driver.
    ///
    /// # Errors
    /// Returns whatever the driver reports.
    pub async fn destroy(&self) -> Result<(), BridgeError> {
        self.driver.destroy().await
    }
}
