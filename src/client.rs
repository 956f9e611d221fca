use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::BridgeError;
use crate::results::ResultSet;
use crate::types::{IsolationLevel, QueryAndParams, RowValues};

/// The two raw-execution entry points an ORM client exposes.
///
/// Object safe, so adapters can hold any client (root, transaction-scoped, replica) behind
/// `Arc<dyn RawExecutor>`.
#[async_trait]
pub trait RawExecutor: Send + Sync {
    /// Run a statement and return its rows.
    async fn query_raw(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, BridgeError>;

    /// Run a statement and return the number of affected rows.
    async fn execute_raw(&self, sql: &str, params: &[RowValues]) -> Result<u64, BridgeError>;

    /// A read-only replica handle, when the client routes reads.
    fn read_replica(&self) -> Option<Arc<dyn RawExecutor>> {
        None
    }

    /// Whether a query builder is already attached to this client lineage.
    fn is_extended(&self) -> bool {
        false
    }
}

/// An ORM client with native transaction control.
#[async_trait]
pub trait OrmClient: RawExecutor + Clone + 'static {
    /// Handle bound to one open interactive transaction.
    type Tx: RawExecutor + Clone + 'static;

    /// Run `f` inside an interactive transaction.
    ///
    /// Commits when `f` resolves `Ok`, rolls back when it resolves `Err` (or times out),
    /// and returns `f`'s outcome.
    async fn transaction<T, F, Fut>(
        &self,
        options: TransactionOptions,
        f: F,
    ) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: FnOnce(Self::Tx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BridgeError>> + Send + 'static;

    /// Run pre-built statements atomically, returning each statement's affected-row count.
    async fn batch_transaction(
        &self,
        statements: Vec<QueryAndParams>,
    ) -> Result<Vec<u64>, BridgeError>;
}

#[async_trait]
impl<E: RawExecutor + ?Sized> RawExecutor for Arc<E> {
    async fn query_raw(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, BridgeError> {
        (**self).query_raw(sql, params).await
    }

    async fn execute_raw(&self, sql: &str, params: &[RowValues]) -> Result<u64, BridgeError> {
        (**self).execute_raw(sql, params).await
    }

    fn read_replica(&self) -> Option<Arc<dyn RawExecutor>> {
        (**self).read_replica()
    }

    fn is_extended(&self) -> bool {
        (**self).is_extended()
    }
}

/// Options for an interactive transaction. Interpreted by the ORM client only.
///
/// Deserializable so applications can keep transaction defaults next to the rest of their
/// configuration; missing fields take the defaults below.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransactionOptions {
    /// Longest the callback may run before the transaction is rolled back.
    pub timeout: Option<Duration>,
    /// Longest to wait before the transaction starts, covering connection checkout and any
    /// lock the backend must take to begin.
    pub max_wait: Option<Duration>,
    pub isolation_level: Option<IsolationLevel>,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(5)),
            max_wait: Some(Duration::from_secs(2)),
            isolation_level: None,
        }
    }
}

impl TransactionOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    #[must_use]
    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }
}
