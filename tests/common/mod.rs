#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use orm_query_bridge::prelude::*;
use tempfile::tempdir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Query,
    Execute,
}

pub type CallLog = Arc<Mutex<Vec<(Primitive, String)>>>;

/// Records which raw primitive every statement went through, then forwards it.
///
/// Transaction handles share the parent's log.
#[derive(Debug, Clone)]
pub struct Spy<C> {
    pub inner: C,
    pub log: CallLog,
}

impl<C> Spy<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<(Primitive, String)> {
        self.log.lock().unwrap().clone()
    }

    pub fn primitives(&self) -> Vec<Primitive> {
        self.calls().into_iter().map(|(p, _)| p).collect()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }

    fn record(&self, primitive: Primitive, sql: &str) {
        self.log.lock().unwrap().push((primitive, sql.to_owned()));
    }
}

#[async_trait]
impl<C: RawExecutor> RawExecutor for Spy<C> {
    async fn query_raw(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, BridgeError> {
        self.record(Primitive::Query, sql);
        self.inner.query_raw(sql, params).await
    }

    async fn execute_raw(&self, sql: &str, params: &[RowValues]) -> Result<u64, BridgeError> {
        self.record(Primitive::Execute, sql);
        self.inner.execute_raw(sql, params).await
    }

    fn read_replica(&self) -> Option<Arc<dyn RawExecutor>> {
        self.inner.read_replica()
    }

    fn is_extended(&self) -> bool {
        self.inner.is_extended()
    }
}

#[async_trait]
impl<C: OrmClient> OrmClient for Spy<C> {
    type Tx = Spy<C::Tx>;

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
        let log = Arc::clone(&self.log);
        self.inner
            .transaction(options, move |tx| f(Spy { inner: tx, log }))
            .await
    }

    async fn batch_transaction(
        &self,
        statements: Vec<QueryAndParams>,
    ) -> Result<Vec<u64>, BridgeError> {
        self.inner.batch_transaction(statements).await
    }
}

pub fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    // Leak the tempdir so the file persists for the duration of the test binary.
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

pub async fn connect(prefix: &str) -> Result<SqliteClient, BridgeError> {
    let client = SqliteClient::connect(SqliteOptions::new(unique_db_path(prefix))).await?;
    client
        .execute_batch(r#"CREATE TABLE "Model" (id INTEGER PRIMARY KEY, value TEXT NOT NULL);"#)
        .await?;
    Ok(client)
}

pub fn query_builders() -> Extension<QueryBuilder> {
    Extension::new(|driver| Ok(QueryBuilder::new(driver)))
}

pub async fn count_models<C: RawExecutor>(client: &C) -> Result<i64, BridgeError> {
    let rs = client
        .query_raw(r#"SELECT COUNT(*) AS n FROM "Model""#, &[])
        .await?;
    let rows = rs.into_rows();
    Ok(rows
        .first()
        .and_then(|row| row.get("n"))
        .and_then(RowValues::as_int)
        .copied()
        .unwrap_or_default())
}
