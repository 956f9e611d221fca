use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::adapter::{OrmDriver, RoutingConfig};
use crate::builder::QueryBuilder;
use crate::client::{OrmClient, RawExecutor, TransactionOptions};
use crate::error::BridgeError;
use crate::results::ResultSet;
use crate::types::{QueryAndParams, RowValues};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Query { sql: String, params: Vec<RowValues> },
    Execute { sql: String, params: Vec<RowValues> },
    Begin(TransactionOptions),
    Commit,
    Rollback,
}

/// Spy over the raw primitives: records every call and answers with canned results.
#[derive(Clone)]
pub(crate) struct RecordingExecutor {
    calls: Arc<Mutex<Vec<Call>>>,
    rows: ResultSet,
    affected: u64,
    failure: Option<String>,
    replica: Option<Arc<dyn RawExecutor>>,
}

impl fmt::Debug for RecordingExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingExecutor")
            .field("calls", &self.calls().len())
            .field("affected", &self.affected)
            .finish_non_exhaustive()
    }
}

impl RecordingExecutor {
    pub(crate) fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            rows: ResultSet::default(),
            affected: 0,
            failure: None,
            replica: None,
        }
    }

    pub(crate) fn with_rows(mut self, rows: ResultSet) -> Self {
        self.rows = rows;
        self
    }

    pub(crate) fn with_affected(mut self, affected: u64) -> Self {
        self.affected = affected;
        self
    }

    pub(crate) fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_owned());
        self
    }

    pub(crate) fn with_replica(mut self, replica: Arc<dyn RawExecutor>) -> Self {
        self.replica = Some(replica);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: Call) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl RawExecutor for RecordingExecutor {
    async fn query_raw(&self, sql: &str, params: &[RowValues]) -> Result<ResultSet, BridgeError> {
        self.record(Call::Query {
            sql: sql.to_owned(),
            params: params.to_vec(),
        });
        match &self.failure {
            Some(message) => Err(BridgeError::ExecutionError(message.clone())),
            None => Ok(self.rows.clone()),
        }
    }

    async fn execute_raw(&self, sql: &str, params: &[RowValues]) -> Result<u64, BridgeError> {
        self.record(Call::Execute {
            sql: sql.to_owned(),
            params: params.to_vec(),
        });
        match &self.failure {
            Some(message) => Err(BridgeError::ExecutionError(message.clone())),
            None => Ok(self.affected),
        }
    }

    fn read_replica(&self) -> Option<Arc<dyn RawExecutor>> {
        self.replica.clone()
    }
}

#[async_trait]
impl OrmClient for RecordingExecutor {
    type Tx = RecordingExecutor;

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
        self.record(Call::Begin(options));
        let outcome = f(self.clone()).await;
        self.record(if outcome.is_ok() {
            Call::Commit
        } else {
            Call::Rollback
        });
        outcome
    }

    async fn batch_transaction(
        &self,
        statements: Vec<QueryAndParams>,
    ) -> Result<Vec<u64>, BridgeError> {
        let mut counts = Vec::with_capacity(statements.len());
        for statement in statements {
            counts.push(self.execute_raw(&statement.query, &statement.params).await?);
        }
        Ok(counts)
    }
}

/// A query builder whose statements land on a throwaway recorder.
pub(crate) fn detached_builder() -> QueryBuilder {
    QueryBuilder::new(OrmDriver::new(
        Arc::new(RecordingExecutor::new()),
        RoutingConfig::default(),
    ))
}
