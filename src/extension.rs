//! Attaching a query builder to an ORM client.
//!
//! [`Extension::apply`] wraps a client in an [`Extended`] that carries one query-builder
//! instance built from an [`OrmDriver`]. The wrapper forwards the raw primitives to the client
//! and intercepts interactive transactions: each transaction-scoped handle gets a fresh
//! query builder bound to that transaction, never the parent's.
//!
//! ```rust,no_run
//! use orm_query_bridge::prelude::*;
//!
//! # async fn demo() -> Result<(), BridgeError> {
//! let client = SqliteClient::connect(SqliteOptions::new("app.db".into())).await?;
//! let db = Extension::new(|driver| Ok(QueryBuilder::new(driver))).apply(client)?;
//!
//! db.transaction(TransactionOptions::default(), |tx| async move {
//!     tx.query_builder()
//!         .update_table("User")
//!         .set("name", "John Doe")
//!         .where_eq("id", 1_i64)
//!         .execute()
//!         .await?;
//!     Ok(())
//! })
//! .await?;
//! # Ok(()) }
//! ```

use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::adapter::{OrmDriver, RoutingConfig};
use crate::client::{OrmClient, RawExecutor, TransactionOptions};
use crate::error::BridgeError;
use crate::results::ResultSet;
use crate::types::{QueryAndParams, RowValues};

type Factory<Q> = dyn Fn(OrmDriver) -> Result<Q, BridgeError> + Send + Sync;

/// Reusable recipe for attaching a query builder to ORM clients.
///
/// The same `Extension` can be applied to several clients (a primary and its replicas, say);
/// every application and every transaction calls the factory again.
pub struct Extension<Q> {
    factory: Arc<Factory<Q>>,
    routing: RoutingConfig,
}

impl<Q> Clone for Extension<Q> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            routing: self.routing,
        }
    }
}

impl<Q> fmt::Debug for Extension<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("routing", &self.routing)
            .finish_non_exhaustive()
    }
}

impl<Q: Send + Sync + 'static> Extension<Q> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(OrmDriver) -> Result<Q, BridgeError> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            routing: RoutingConfig::default(),
        }
    }

    #[must_use]
    pub fn with_read_replica(mut self, enabled: bool) -> Self {
        self.routing.with_read_replica = enabled;
        self
    }

    #[must_use]
    pub fn with_routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    #[must_use]
    pub fn routing(&self) -> RoutingConfig {
        self.routing
    }

    /// Attach a query builder to `client`.
    ///
    /// # Errors
    /// Returns `BridgeError::AlreadyExtended` when the client lineage already carries a query
    /// builder, or whatever the factory fails with. Nothing is attached on failure.
    pub fn apply<C>(&self, client: C) -> Result<Extended<C, Q>, BridgeError>
    where
        C: RawExecutor + Clone + 'static,
    {
        if client.is_extended() {
            return Err(BridgeError::AlreadyExtended);
        }
        let extended = self.bind(client)?;
        debug!(routing = ?self.routing, "attached query builder to ORM client");
        Ok(extended)
    }

    fn bind<C>(&self, client: C) -> Result<Extended<C, Q>, BridgeError>
    where
        C: RawExecutor + Clone + 'static,
    {
        let driver = OrmDriver::new(Arc::new(client.clone()), self.routing);
        let query_builder = (self.factory)(driver)?;
        Ok(Extended {
            client,
            query_builder: Arc::new(query_builder),
            extension: self.clone(),
        })
    }
}

/// An ORM client with an attached query builder.
///
/// Dereferences to the wrapped client, so every client method stays reachable unchanged.
pub struct Extended<C, Q> {
    client: C,
    query_builder: Arc<Q>,
    extension: Extension<Q>,
}

impl<C: Clone, Q> Clone for Extended<C, Q> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            query_builder: Arc::clone(&self.query_builder),
            extension: self.extension.clone(),
        }
    }
}

impl<C: fmt::Debug, Q> fmt::Debug for Extended<C, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extended")
            .field("client", &self.client)
            .field("routing", &self.extension.routing)
            .finish_non_exhaustive()
    }
}

impl<C, Q> Extended<C, Q> {
    /// The query builder attached to this client.
    #[must_use]
    pub fn query_builder(&self) -> &Q {
        &self.query_builder
    }

    /// Whether two handles carry the very same query-builder instance.
    #[must_use]
    pub fn shares_query_builder<D>(&self, other: &Extended<D, Q>) -> bool {
        Arc::ptr_eq(&self.query_builder, &other.query_builder)
    }

    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn into_inner(self) -> C {
        self.client
    }
}

impl<C, Q> Deref for Extended<C, Q> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<C, Q> RawExecutor for Extended<C, Q>
where
    C: RawExecutor,
    Q: Send + Sync,
{
    async fn query_raw(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, BridgeError> {
        self.client.query_raw(sql, params).await
    }

    async fn execute_raw(&self, sql: &str, params: &[RowValues]) -> Result<u64, BridgeError> {
        self.client.execute_raw(sql, params).await
    }

    fn read_replica(&self) -> Option<Arc<dyn RawExecutor>> {
        self.client.read_replica()
    }

    fn is_extended(&self) -> bool {
        true
    }
}

#[async_trait]
impl<C, Q> OrmClient for Extended<C, Q>
where
    C: OrmClient,
    Q: Send + Sync + 'static,
{
    type Tx = Extended<C::Tx, Q>;

    /// Delegates to the client's transaction, handing the callback a transaction-scoped handle
    /// with its own freshly built query builder. Options pass through untouched; commit and
    /// rollback are the client's alone.
    async fn transaction<T, F, Fut>(
        &self,
        options: TransactionOptions,
        f: F,
    ) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: FnOnce(Self::Tx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BridgeError>> + Send + 'static,
    {
        let extension = self.extension.clone();
        self.client
            .transaction(options, move |tx| async move {
                let scoped = extension.bind(tx)?;
                debug!("bound query builder to transaction");
                f(scoped).await
            })
            .await
    }

    /// Batches produce no new client handle, so they pass straight through.
    async fn batch_transaction(
        &self,
        statements: Vec<QueryAndParams>,
    ) -> Result<Vec<u64>, BridgeError> {
        self.client.batch_transaction(statements).await
    }
}
