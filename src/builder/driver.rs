use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::compiled::CompiledQuery;
use crate::error::BridgeError;
use crate::results::QueryResult;
use crate::types::IsolationLevel;

/// Stream of result chunks produced by [`DatabaseConnection::stream_query`].
pub type QueryStream = BoxStream<'static, Result<QueryResult, BridgeError>>;

/// One logical connection the query builder executes compiled statements on.
#[async_trait]
pub trait DatabaseConnection: Send + Sync {
    async fn execute_query(&self, compiled: &CompiledQuery) -> Result<QueryResult, BridgeError>;

    /// Begin delivering results in chunks of `chunk_size` rows.
    ///
    /// # Errors
    /// Implementations that cannot stream fail here, before any row is produced.
    fn stream_query(
        &self,
        compiled: &CompiledQuery,
        chunk_size: usize,
    ) -> Result<QueryStream, BridgeError>;
}

/// Settings the query builder passes when it opens its own transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionSettings {
    pub isolation_level: Option<IsolationLevel>,
}

/// Everything the query builder needs from a database driver.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn init(&self) -> Result<(), BridgeError>;

    async fn acquire_connection(&self) -> Result<Arc<dyn DatabaseConnection>, BridgeError>;

    async fn begin_transaction(
        &self,
        connection: &dyn DatabaseConnection,
        settings: &TransactionSettings,
    ) -> Result<(), BridgeError>;

    async fn commit_transaction(
        &self,
        connection: &dyn DatabaseConnection,
    ) -> Result<(), BridgeError>;

    async fn rollback_transaction(
        &self,
        connection: &dyn DatabaseConnection,
    ) -> Result<(), BridgeError>;

    async fn release_connection(
        &self,
        connection: Arc<dyn DatabaseConnection>,
    ) -> Result<(), BridgeError>;

    async fn destroy(&self) -> Result<(), BridgeError>;
}
