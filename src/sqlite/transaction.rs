use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use bb8::PooledConnection;
use tracing::warn;

use crate::client::RawExecutor;
use crate::error::BridgeError;
use crate::results::ResultSet;
use crate::types::RowValues;

use super::config::{SharedSqliteConnection, SqliteManager};
use super::params::Params;
use super::query::{execute_on, run_blocking, select_on};

const ROLLBACK_BUSY_RETRIES: &[Duration] = &[
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
];

pub(crate) fn rollback_with_busy_retries(
    conn: &mut rusqlite::Connection,
) -> Result<(), BridgeError> {
    for (idx, delay) in ROLLBACK_BUSY_RETRIES.iter().copied().enumerate() {
        match conn.execute_batch("ROLLBACK") {
            Ok(()) => return Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    && idx + 1 < ROLLBACK_BUSY_RETRIES.len() =>
            {
                thread::sleep(delay);
            }
            Err(e) => return Err(BridgeError::SqliteError(e)),
        }
    }

    Err(BridgeError::TransactionError(
        "rollback retries exhausted".into(),
    ))
}

struct TxInner {
    conn: Mutex<Option<PooledConnection<'static, SqliteManager>>>,
    /// Cleared under the connection lock when the transaction ends.
    open: Arc<AtomicBool>,
}

/// Client handle bound to one open `SQLite` transaction.
///
/// Clones share the transaction. Once it has been committed or rolled back every clone fails
/// with "Transaction already closed". Dropping the last clone of a still-open transaction
/// rolls it back in the background before the connection returns to the pool.
#[derive(Clone)]
pub struct SqliteTxClient {
    inner: Arc<TxInner>,
}

impl fmt::Debug for SqliteTxClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteTxClient")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SqliteTxClient {
    /// Open a transaction on a checked-out connection.
    ///
    /// `BEGIN IMMEDIATE` takes the write lock up front so concurrent transactions queue on the
    /// busy timeout instead of failing on lock upgrade. `lock_wait` replaces that timeout for
    /// the `BEGIN` alone; `busy_timeout` is restored afterwards.
    pub(crate) async fn begin(
        conn: PooledConnection<'static, SqliteManager>,
        lock_wait: Option<Duration>,
        busy_timeout: Duration,
    ) -> Result<Self, BridgeError> {
        run_blocking(Arc::clone(&*conn), move |guard| {
            let Some(lock_wait) = lock_wait else {
                guard.execute_batch("BEGIN IMMEDIATE")?;
                return Ok(());
            };
            guard.busy_timeout(lock_wait)?;
            let begun = guard.execute_batch("BEGIN IMMEDIATE");
            let restored = guard.busy_timeout(busy_timeout);
            begun?;
            restored?;
            Ok(())
        })
        .await?;
        Ok(Self {
            inner: Arc::new(TxInner {
                conn: Mutex::new(Some(conn)),
                open: Arc::new(AtomicBool::new(true)),
            }),
        })
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.conn.lock().map(|c| c.is_none()).unwrap_or(true)
    }

    fn handle(&self) -> Result<(SharedSqliteConnection, Arc<AtomicBool>), BridgeError> {
        let slot = self.inner.conn.lock().map_err(|_| closed())?;
        let conn = slot.as_ref().map(|c| Arc::clone(&**c)).ok_or_else(closed)?;
        Ok((conn, Arc::clone(&self.inner.open)))
    }

    fn take(&self) -> Result<PooledConnection<'static, SqliteManager>, BridgeError> {
        let mut slot = self.inner.conn.lock().map_err(|_| closed())?;
        slot.take().ok_or_else(closed)
    }

    /// # Errors
    /// Returns `BridgeError::TransactionError` when the transaction is already closed, or the
    /// commit failure itself. A failed commit leaves the transaction rolled back.
    pub(crate) async fn commit(&self) -> Result<(), BridgeError> {
        let conn = self.take()?;
        let open = Arc::clone(&self.inner.open);
        let outcome = run_blocking(Arc::clone(&*conn), move |guard| {
            open.store(false, Ordering::Release);
            if let Err(e) = guard.execute_batch("COMMIT") {
                if !guard.is_autocommit() {
                    let _ = rollback_with_busy_retries(guard);
                }
                return Err(BridgeError::SqliteError(e));
            }
            Ok(())
        })
        .await;
        drop(conn);
        outcome
    }

    /// # Errors
    /// Returns `BridgeError::TransactionError` when the transaction is already closed, or the
    /// rollback failure. The connection is then discarded by the pool.
    pub(crate) async fn rollback(&self) -> Result<(), BridgeError> {
        let conn = self.take()?;
        let open = Arc::clone(&self.inner.open);
        let outcome = run_blocking(Arc::clone(&*conn), move |guard| {
            open.store(false, Ordering::Release);
            if guard.is_autocommit() {
                return Ok(());
            }
            rollback_with_busy_retries(guard)
        })
        .await;
        drop(conn);
        outcome
    }
}

fn closed() -> BridgeError {
    BridgeError::TransactionError("Transaction already closed".into())
}

/// Checked under the connection lock: a statement queued before commit or rollback must not
/// run once the connection has left this transaction.
fn ensure_open(conn: &rusqlite::Connection, open: &AtomicBool) -> Result<(), BridgeError> {
    if !open.load(Ordering::Acquire) || conn.is_autocommit() {
        return Err(closed());
    }
    Ok(())
}

#[async_trait]
impl RawExecutor for SqliteTxClient {
    async fn query_raw(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, BridgeError> {
        let (handle, open) = self.handle()?;
        let sql = sql.to_owned();
        let params = Params::convert(params);
        run_blocking(handle, move |guard| {
            ensure_open(guard, &open)?;
            select_on(guard, &sql, params.as_values())
        })
        .await
    }

    async fn execute_raw(&self, sql: &str, params: &[RowValues]) -> Result<u64, BridgeError> {
        let (handle, open) = self.handle()?;
        let sql = sql.to_owned();
        let params = Params::convert(params);
        run_blocking(handle, move |guard| {
            ensure_open(guard, &open)?;
            execute_on(guard, &sql, params.as_values())
        })
        .await
    }
}

impl Drop for TxInner {
    fn drop(&mut self) {
        let Ok(slot) = self.conn.get_mut() else {
            return;
        };
        if let Some(conn) = slot.take()
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            let open = Arc::clone(&self.open);
            handle.spawn_blocking(move || {
                let conn_handle: SharedSqliteConnection = Arc::clone(&*conn);
                let mut guard = conn_handle.blocking_lock();
                open.store(false, Ordering::Release);
                if !guard.is_autocommit()
                    && let Err(e) = rollback_with_busy_retries(&mut guard)
                {
                    warn!(error = %e, "background rollback of dropped transaction failed");
                }
                drop(guard);
                drop(conn);
            });
        }
    }
}
