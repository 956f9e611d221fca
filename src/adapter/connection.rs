use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::builder::{DatabaseConnection, QueryStream};
use crate::client::RawExecutor;
use crate::compiled::{CompiledQuery, QueryNode};
use crate::error::{BridgeError, Capability};
use crate::results::QueryResult;

use super::RoutingConfig;

/// A query-builder connection that runs statements through an ORM client.
///
/// The ORM has no discrete connection object, so every instance is interchangeable: it only
/// holds the shared client handle and the routing configuration of its driver.
#[derive(Clone)]
pub struct OrmConnection {
    client: Arc<dyn RawExecutor>,
    routing: RoutingConfig,
}

impl fmt::Debug for OrmConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrmConnection")
            .field("client", &"<RawExecutor>")
            .field("routing", &self.routing)
            .finish()
    }
}

impl OrmConnection {
    pub(crate) fn new(client: Arc<dyn RawExecutor>, routing: RoutingConfig) -> Self {
        Self { client, routing }
    }

    /// Replica for selects when routing allows it, otherwise the primary.
    fn read_target(&self, query: &QueryNode) -> Arc<dyn RawExecutor> {
        if self.routing.with_read_replica
            && query.is_replica_safe()
            && let Some(replica) = self.client.read_replica()
        {
            trace!("routing read to replica");
            return replica;
        }
        Arc::clone(&self.client)
    }
}

#[async_trait]
impl DatabaseConnection for OrmConnection {
    async fn execute_query(&self, compiled: &CompiledQuery) -> Result<QueryResult, BridgeError> {
        let CompiledQuery {
            sql,
            parameters,
            query,
        } = compiled;
        let caller = Backtrace::capture();

        let outcome = if query.should_return_affected_rows() {
            trace!(kind = ?query.kind, "executing for affected rows");
            self.client
                .execute_raw(sql, parameters)
                .await
                .map(|num_affected_rows| QueryResult::Affected { num_affected_rows })
        } else {
            trace!(kind = ?query.kind, "querying for rows");
            self.read_target(query)
                .query_raw(sql, parameters)
                .await
                .map(|rows| QueryResult::Rows(rows.into_rows()))
        };

        outcome.map_err(|err| {
            debug!(error = %err, sql = %sql, "statement failed");
            err.with_caller(&caller)
        })
    }

    fn stream_query(
        &self,
        _compiled: &CompiledQuery,
        _chunk_size: usize,
    ) -> Result<QueryStream, BridgeError> {
        Err(BridgeError::Unsupported(Capability::StreamingQueries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled::StatementKind;
    use crate::error::ErrorKind;
    use crate::results::ResultSet;
    use crate::test_support::{Call, RecordingExecutor};
    use crate::types::RowValues;

    fn one_row() -> ResultSet {
        let mut rs = ResultSet::with_capacity(1);
        rs.set_column_names(Arc::new(vec!["id".into(), "value".into()]));
        rs.add_row_values(vec![RowValues::Int(1), RowValues::Text("test".into())]);
        rs
    }

    fn compiled(kind: StatementKind, returning: bool) -> CompiledQuery {
        CompiledQuery::new(
            "delete from \"Model\" where \"id\" = ?",
            vec![RowValues::Int(1)],
            QueryNode::new(kind).with_returning(returning),
        )
    }

    #[tokio::test]
    async fn plain_mutations_report_affected_rows() {
        for kind in [StatementKind::Insert, StatementKind::Update, StatementKind::Delete] {
            let spy = RecordingExecutor::new().with_affected(1).with_rows(one_row());
            let conn = OrmConnection::new(Arc::new(spy.clone()), RoutingConfig::default());
            let query = compiled(kind, false);

            let result = conn.execute_query(&query).await.unwrap();

            assert_eq!(
                result,
                QueryResult::Affected {
                    num_affected_rows: 1
                }
            );
            assert!(result.rows().is_empty());
            assert_eq!(
                spy.calls(),
                vec![Call::Execute {
                    sql: query.sql.clone(),
                    params: query.parameters.clone()
                }]
            );
        }
    }

    #[tokio::test]
    async fn selects_and_returning_mutations_return_rows() {
        for (kind, returning) in [
            (StatementKind::Select, false),
            (StatementKind::Raw, false),
            (StatementKind::Insert, true),
            (StatementKind::Update, true),
            (StatementKind::Delete, true),
        ] {
            let spy = RecordingExecutor::new().with_affected(7).with_rows(one_row());
            let conn = OrmConnection::new(Arc::new(spy.clone()), RoutingConfig::default());
            let query = compiled(kind, returning);

            let result = conn.execute_query(&query).await.unwrap();

            assert_eq!(result, QueryResult::Rows(one_row().into_rows()));
            assert_eq!(
                spy.calls(),
                vec![Call::Query {
                    sql: query.sql.clone(),
                    params: query.parameters.clone()
                }]
            );
        }
    }

    #[tokio::test]
    async fn plain_reads_follow_the_replica() {
        let replica = RecordingExecutor::new().with_rows(one_row());
        let primary = RecordingExecutor::new()
            .with_affected(2)
            .with_replica(Arc::new(replica.clone()));
        let conn = OrmConnection::new(
            Arc::new(primary.clone()),
            RoutingConfig::default().with_read_replica(true),
        );

        conn.execute_query(&compiled(StatementKind::Select, false))
            .await
            .unwrap();
        conn.execute_query(&compiled(StatementKind::Delete, true))
            .await
            .unwrap();
        conn.execute_query(&compiled(StatementKind::Update, false))
            .await
            .unwrap();

        assert_eq!(replica.calls().len(), 1);
        assert!(matches!(replica.calls()[0], Call::Query { .. }));
        let primary_calls = primary.calls();
        assert_eq!(primary_calls.len(), 2);
        assert!(matches!(primary_calls[0], Call::Query { .. }));
        assert!(matches!(primary_calls[1], Call::Execute { .. }));
    }

    #[tokio::test]
    async fn raw_sql_stays_on_the_primary() {
        let replica = RecordingExecutor::new();
        let primary = RecordingExecutor::new()
            .with_rows(one_row())
            .with_replica(Arc::new(replica.clone()));
        let conn = OrmConnection::new(
            Arc::new(primary.clone()),
            RoutingConfig::default().with_read_replica(true),
        );
        let raw = CompiledQuery::raw(
            "insert into \"Model\" (\"value\") values (?) returning id",
            vec![RowValues::Text("x".into())],
        );

        let result = conn.execute_query(&raw).await.unwrap();

        assert_eq!(result, QueryResult::Rows(one_row().into_rows()));
        assert!(replica.calls().is_empty());
        assert_eq!(
            primary.calls(),
            vec![Call::Query {
                sql: raw.sql.clone(),
                params: raw.parameters.clone()
            }]
        );
    }

    #[tokio::test]
    async fn replica_ignored_unless_enabled() {
        let replica = RecordingExecutor::new();
        let primary = RecordingExecutor::new().with_replica(Arc::new(replica.clone()));
        let conn = OrmConnection::new(Arc::new(primary.clone()), RoutingConfig::default());

        conn.execute_query(&compiled(StatementKind::Select, false))
            .await
            .unwrap();

        assert!(replica.calls().is_empty());
        assert_eq!(primary.calls().len(), 1);
    }

    #[tokio::test]
    async fn failures_keep_their_classification() {
        let spy = RecordingExecutor::new().failing("constraint failed");
        let conn = OrmConnection::new(Arc::new(spy), RoutingConfig::default());

        let err = conn
            .execute_query(&compiled(StatementKind::Insert, false))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Execution);
        assert!(
            matches!(err.root(), BridgeError::ExecutionError(msg) if msg == "constraint failed")
        );
    }

    #[test]
    fn streaming_is_refused() {
        let conn = OrmConnection::new(
            Arc::new(RecordingExecutor::new()),
            RoutingConfig::default(),
        );
        let err = conn
            .stream_query(&compiled(StatementKind::Select, false), 100)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            BridgeError::Unsupported(Capability::StreamingQueries)
        ));
    }
}
