use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bb8::ManageConnection;
use tokio::sync::Mutex;

use crate::error::BridgeError;

use super::client::SqliteClient;

/// A pooled `SQLite` connection. The mutex lets blocking work run on the blocking pool while the
/// pooled handle stays on the async side.
pub type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// Options for configuring a `SQLite` client.
///
/// Every pooled connection opens `db_path` separately, so use a file path; `:memory:` would
/// give each connection its own empty database.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub db_path: String,
    pub pool_size: u32,
    pub busy_timeout: Duration,
    pub connect_timeout: Duration,
    pub wal: bool,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            pool_size: 8,
            busy_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(30),
            wal: true,
        }
    }

    #[must_use]
    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn pool_size(mut self, pool_size: u32) -> Self {
        self.opts.pool_size = pool_size;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.opts.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.opts.connect_timeout = connect_timeout;
        self
    }

    #[must_use]
    pub fn wal(mut self, wal: bool) -> Self {
        self.opts.wal = wal;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// Build a connected `SqliteClient`.
    ///
    /// # Errors
    /// Returns `BridgeError` if pool creation or the initial smoke test fails.
    pub async fn build(self) -> Result<SqliteClient, BridgeError> {
        SqliteClient::connect(self.finish()).await
    }
}

/// bb8 manager for `SQLite` connections.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    db_path: String,
    busy_timeout: Duration,
    wal: bool,
}

impl SqliteManager {
    #[must_use]
    pub fn new(opts: &SqliteOptions) -> Self {
        Self {
            db_path: opts.db_path.clone(),
            busy_timeout: opts.busy_timeout,
            wal: opts.wal,
        }
    }
}

impl ManageConnection for SqliteManager {
    type Connection = SharedSqliteConnection;
    type Error = BridgeError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let manager = self.clone();
        async move {
            let conn = tokio::task::spawn_blocking(move || {
                let conn = rusqlite::Connection::open(&manager.db_path)?;
                conn.busy_timeout(manager.busy_timeout)?;
                if manager.wal {
                    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
                }
                Ok::<_, BridgeError>(conn)
            })
            .await
            .map_err(|e| {
                BridgeError::ConnectionError(format!("sqlite spawn_blocking join error: {e}"))
            })??;
            Ok(Arc::new(Mutex::new(conn)))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let handle = Arc::clone(conn);
        async move {
            super::query::run_blocking(handle, |guard| {
                guard.query_row("SELECT 1", [], |_| Ok(()))?;
                Ok(())
            })
            .await
        }
    }

    /// A connection still inside a transaction (a failed rollback) or still held by a blocking
    /// task must not go back to the pool.
    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        match conn.try_lock() {
            Ok(guard) => !guard.is_autocommit(),
            Err(_) => true,
        }
    }
}
