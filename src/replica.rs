use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::client::{OrmClient, RawExecutor, TransactionOptions};
use crate::error::BridgeError;
use crate::results::ResultSet;
use crate::types::{QueryAndParams, RowValues};

/// A primary client paired with one or more read replicas.
///
/// Writes, transactions and batches always go to the primary. Raw execution on the composite
/// itself also targets the primary; only adapters configured to route reads (or callers using
/// [`ReadReplicas::replica`]) reach a replica. Replicas are handed out round-robin.
pub struct ReadReplicas<P, R> {
    primary: P,
    replicas: Arc<Vec<Arc<R>>>,
    next: Arc<AtomicUsize>,
}

impl<P: Clone, R> Clone for ReadReplicas<P, R> {
    fn clone(&self) -> Self {
        Self {
            primary: self.primary.clone(),
            replicas: Arc::clone(&self.replicas),
            next: Arc::clone(&self.next),
        }
    }
}

impl<P: fmt::Debug, R> fmt::Debug for ReadReplicas<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadReplicas")
            .field("primary", &self.primary)
            .field("replicas", &self.replicas.len())
            .finish()
    }
}

impl<P, R> ReadReplicas<P, R> {
    /// # Errors
    /// Returns `BridgeError::ConfigError` when `replicas` is empty.
    pub fn new(primary: P, replicas: Vec<R>) -> Result<Self, BridgeError> {
        if replicas.is_empty() {
            return Err(BridgeError::ConfigError(
                "at least one read replica is required".into(),
            ));
        }
        Ok(Self {
            primary,
            replicas: Arc::new(replicas.into_iter().map(Arc::new).collect()),
            next: Arc::new(AtomicUsize::new(0)),
        })
    }

    #[must_use]
    pub fn primary(&self) -> &P {
        &self.primary
    }

    /// The next replica in round-robin order.
    #[must_use]
    pub fn replica(&self) -> &R {
        self.next_replica()
    }

    #[must_use]
    pub fn replicas(&self) -> &[Arc<R>] {
        &self.replicas
    }

    fn next_replica(&self) -> &Arc<R> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.replicas.len();
        &self.replicas[idx]
    }
}

impl<P, R> Deref for ReadReplicas<P, R> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.primary
    }
}

#[async_trait]
impl<P, R> RawExecutor for ReadReplicas<P, R>
where
    P: RawExecutor,
    R: RawExecutor + 'static,
{
    async fn query_raw(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, BridgeError> {
        self.primary.query_raw(sql, params).await
    }

    async fn execute_raw(&self, sql: &str, params: &[RowValues]) -> Result<u64, BridgeError> {
        self.primary.execute_raw(sql, params).await
    }

    fn read_replica(&self) -> Option<Arc<dyn RawExecutor>> {
        let replica: Arc<R> = Arc::clone(self.next_replica());
        Some(replica)
    }

    fn is_extended(&self) -> bool {
        self.primary.is_extended()
    }
}

#[async_trait]
impl<P, R> OrmClient for ReadReplicas<P, R>
where
    P: OrmClient,
    R: RawExecutor + 'static,
{
    type Tx = P::Tx;

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
        self.primary.transaction(options, f).await
    }

    async fn batch_transaction(
        &self,
        statements: Vec<QueryAndParams>,
    ) -> Result<Vec<u64>, BridgeError> {
        self.primary.batch_transaction(statements).await
    }
}
