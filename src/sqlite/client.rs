use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tracing::{debug, warn};

use crate::client::{OrmClient, RawExecutor, TransactionOptions};
use crate::error::BridgeError;
use crate::results::ResultSet;
use crate::types::{IsolationLevel, QueryAndParams, RowValues};

use super::config::{SqliteManager, SqliteOptions, SqliteOptionsBuilder};
use super::params::Params;
use super::query::{execute_on, run_blocking, select_on};
use super::transaction::SqliteTxClient;

/// ORM client backed by a bb8 pool of `rusqlite` connections.
#[derive(Clone)]
pub struct SqliteClient {
    pool: Pool<SqliteManager>,
    busy_timeout: Duration,
}

impl fmt::Debug for SqliteClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteClient")
            .field("pool", &self.pool.state())
            .field("busy_timeout", &self.busy_timeout)
            .finish()
    }
}

impl SqliteClient {
    #[must_use]
    pub fn builder(db_path: String) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(db_path)
    }

    /// Create the pool and run a smoke test on one connection.
    ///
    /// # Errors
    /// Returns `BridgeError::ConnectionError` if the pool cannot be built or the database
    /// cannot be opened.
    pub async fn connect(opts: SqliteOptions) -> Result<Self, BridgeError> {
        let pool = Pool::builder()
            .max_size(opts.pool_size)
            .connection_timeout(opts.connect_timeout)
            .build(SqliteManager::new(&opts))
            .await
            .map_err(|e| {
                BridgeError::ConnectionError(format!("Failed to create SQLite pool: {e}"))
            })?;
        let client = Self {
            pool,
            busy_timeout: opts.busy_timeout,
        };
        {
            let conn = client.checkout().await?;
            run_blocking(Arc::clone(&*conn), |guard| {
                guard.query_row("SELECT 1", [], |_| Ok(()))?;
                Ok(())
            })
            .await?;
        }
        debug!(db_path = %opts.db_path, pool_size = opts.pool_size, "sqlite client connected");
        Ok(client)
    }

    /// Run a multi-statement script outside of any transaction.
    ///
    /// # Errors
    /// Returns `BridgeError` if checkout or execution fails.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), BridgeError> {
        let conn = self.checkout().await?;
        let sql = sql.to_owned();
        run_blocking(Arc::clone(&*conn), move |guard| {
            guard.execute_batch(&sql)?;
            Ok(())
        })
        .await
    }

    async fn checkout(&self) -> Result<PooledConnection<'static, SqliteManager>, BridgeError> {
        Ok(self.pool.get_owned().await?)
    }

    /// Check out a connection and open a transaction on it, all within `max_wait`.
    ///
    /// The lock wait of `BEGIN IMMEDIATE` is capped at whatever budget the checkout left.
    async fn begin_within(
        &self,
        max_wait: Option<Duration>,
    ) -> Result<SqliteTxClient, BridgeError> {
        let Some(max_wait) = max_wait else {
            let conn = self.checkout().await?;
            return SqliteTxClient::begin(conn, None, self.busy_timeout).await;
        };
        let started = Instant::now();
        let begin = async {
            let conn = self.checkout().await?;
            let remaining = max_wait.saturating_sub(started.elapsed());
            SqliteTxClient::begin(conn, Some(remaining), self.busy_timeout).await
        };
        match tokio::time::timeout(max_wait, begin).await {
            Ok(Err(err)) if is_busy(&err) => Err(start_timeout(max_wait)),
            Ok(outcome) => outcome,
            Err(_) => Err(start_timeout(max_wait)),
        }
    }
}

fn start_timeout(max_wait: Duration) -> BridgeError {
    BridgeError::TransactionError(format!(
        "Unable to start a transaction in the given time ({} ms)",
        max_wait.as_millis()
    ))
}

fn is_busy(err: &BridgeError) -> bool {
    matches!(
        err,
        BridgeError::SqliteError(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::DatabaseBusy
    )
}

#[async_trait]
impl RawExecutor for SqliteClient {
    async fn query_raw(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, BridgeError> {
        let conn = self.checkout().await?;
        let sql = sql.to_owned();
        let params = Params::convert(params);
        run_blocking(Arc::clone(&*conn), move |guard| {
            select_on(guard, &sql, params.as_values())
        })
        .await
    }

    async fn execute_raw(&self, sql: &str, params: &[RowValues]) -> Result<u64, BridgeError> {
        let conn = self.checkout().await?;
        let sql = sql.to_owned();
        let params = Params::convert(params);
        run_blocking(Arc::clone(&*conn), move |guard| {
            execute_on(guard, &sql, params.as_values())
        })
        .await
    }
}

#[async_trait]
impl OrmClient for SqliteClient {
    type Tx = SqliteTxClient;

    /// `SQLite` transactions are always serializable; any other requested level is rejected.
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
        if let Some(level) = options.isolation_level
            && level != IsolationLevel::Serializable
        {
            return Err(BridgeError::ConfigError(format!(
                "SQLite does not support isolation level {level:?}"
            )));
        }

        let tx = self.begin_within(options.max_wait).await?;

        let outcome = match options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, f(tx.clone()))
                .await
                .unwrap_or_else(|_| {
                    Err(BridgeError::TransactionError(format!(
                        "Transaction timed out after {} ms",
                        timeout.as_millis()
                    )))
                }),
            None => f(tx.clone()).await,
        };

        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed transaction callback failed");
                }
                Err(err)
            }
        }
    }

    async fn batch_transaction(
        &self,
        statements: Vec<QueryAndParams>,
    ) -> Result<Vec<u64>, BridgeError> {
        let conn = self.checkout().await?;
        let statements: Vec<(String, Params)> = statements
            .into_iter()
            .map(|s| {
                let params = Params::convert(&s.params);
                (s.query, params)
            })
            .collect();
        run_blocking(Arc::clone(&*conn), move |guard| {
            let tx = guard.transaction()?;
            let mut counts = Vec::with_capacity(statements.len());
            for (sql, params) in &statements {
                counts.push(execute_on(&tx, sql, params.as_values())?);
            }
            tx.commit()?;
            Ok(counts)
        })
        .await
    }
}
