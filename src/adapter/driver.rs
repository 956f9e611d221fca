use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::builder::{DatabaseConnection, Driver, TransactionSettings};
use crate::client::RawExecutor;
use crate::error::{BridgeError, Capability};

use super::{OrmConnection, RoutingConfig};

/// Query-builder driver backed by an ORM client.
///
/// The client handle is shared, never owned: `init`, `release_connection` and `destroy` do
/// nothing because the ORM manages its own connections. The query builder's transaction
/// lifecycle is always refused; use the ORM's interactive transactions instead.
#[derive(Clone)]
pub struct OrmDriver {
    client: Arc<dyn RawExecutor>,
    routing: RoutingConfig,
}

impl fmt::Debug for OrmDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrmDriver")
            .field("client", &"<RawExecutor>")
            .field("routing", &self.routing)
            .finish()
    }
}

impl OrmDriver {
    pub fn new(client: Arc<dyn RawExecutor>, routing: RoutingConfig) -> Self {
        Self { client, routing }
    }

    #[must_use]
    pub fn routing(&self) -> RoutingConfig {
        self.routing
    }

    /// Build a connection directly, without going through the query builder.
    #[must_use]
    pub fn connection(&self) -> OrmConnection {
        OrmConnection::new(Arc::clone(&self.client), self.routing)
    }
}

#[async_trait]
impl Driver for OrmDriver {
    async fn init(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn acquire_connection(&self) -> Result<Arc<dyn DatabaseConnection>, BridgeError> {
        Ok(Arc::new(self.connection()))
    }

    async fn begin_transaction(
        &self,
        _connection: &dyn DatabaseConnection,
        _settings: &TransactionSettings,
    ) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported(Capability::Transactions))
    }

    async fn commit_transaction(
        &self,
        _connection: &dyn DatabaseConnection,
    ) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported(Capability::Transactions))
    }

    async fn rollback_transaction(
        &self,
        _connection: &dyn DatabaseConnection,
    ) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported(Capability::Transactions))
    }

    async fn release_connection(
        &self,
        _connection: Arc<dyn DatabaseConnection>,
    ) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn destroy(&self) -> Result<(), BridgeError> {
        Ok(())
    }
}
