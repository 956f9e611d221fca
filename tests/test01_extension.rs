#![cfg(feature = "sqlite")]

mod common;

use common::{Primitive, Spy, connect, count_models, query_builders};
use orm_query_bridge::prelude::*;
use serde_json::json;

#[tokio::test]
async fn plain_mutations_go_through_execute() -> Result<(), Box<dyn std::error::Error>> {
    let spy = Spy::new(connect("plain_mutations").await?);
    let db = query_builders().apply(spy.clone())?;
    let qb = db.query_builder();

    let inserted = qb.insert_into("Model").value("value", "test").execute().await?;
    assert_eq!(inserted.num_affected_rows(), Some(1));
    assert!(inserted.rows().is_empty());

    let updated = qb
        .update_table("Model")
        .set("value", "updated")
        .where_eq("id", 1_i64)
        .execute()
        .await?;
    assert_eq!(updated.num_affected_rows(), Some(1));

    let deleted = qb.delete_from("Model").where_eq("id", 1_i64).execute().await?;
    assert_eq!(deleted.num_affected_rows(), Some(1));

    assert_eq!(
        spy.primitives(),
        vec![Primitive::Execute, Primitive::Execute, Primitive::Execute]
    );
    assert_eq!(count_models(&spy).await?, 0);
    Ok(())
}

#[tokio::test]
async fn returning_mutations_go_through_query() -> Result<(), Box<dyn std::error::Error>> {
    let spy = Spy::new(connect("returning_mutations").await?);
    let db = query_builders().apply(spy.clone())?;
    let qb = db.query_builder();

    let inserted = qb
        .insert_into("Model")
        .value("value", "test")
        .returning_all()
        .execute()
        .await?;
    assert_eq!(inserted.num_affected_rows(), None);
    let rows = inserted.into_rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].to_json(), json!({"id": 1, "value": "test"}));

    let updated = qb
        .update_table("Model")
        .set("value", "changed")
        .where_eq("id", 1_i64)
        .returning(["value"])
        .execute()
        .await?
        .into_rows();
    assert_eq!(updated[0].to_json(), json!({"value": "changed"}));

    let deleted = qb
        .delete_from("Model")
        .where_eq("id", 1_i64)
        .returning_all()
        .execute()
        .await?
        .into_rows();
    assert_eq!(deleted[0].to_json(), json!({"id": 1, "value": "changed"}));

    assert_eq!(
        spy.primitives(),
        vec![Primitive::Query, Primitive::Query, Primitive::Query]
    );
    Ok(())
}

#[tokio::test]
async fn selects_return_rows() -> Result<(), Box<dyn std::error::Error>> {
    let spy = Spy::new(connect("selects").await?);
    spy.execute_raw(
        r#"INSERT INTO "Model" (id, value) VALUES (?, ?), (?, ?)"#,
        &[
            RowValues::Int(1),
            RowValues::Text("a".into()),
            RowValues::Int(2),
            RowValues::Text("b".into()),
        ],
    )
    .await?;
    spy.clear();
    let db = query_builders().apply(spy.clone())?;

    let rows = db
        .query_builder()
        .select_from("Model")
        .select_all()
        .where_cmp("id", Comparison::Gt, 1_i64)
        .order_by("id", SortOrder::Asc)
        .execute()
        .await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("value"), Some(&RowValues::Text("b".into())));

    let none = db
        .query_builder()
        .select_from("Model")
        .where_eq("value", "missing")
        .execute_take_first()
        .await?;
    assert!(none.is_none());

    assert_eq!(spy.primitives(), vec![Primitive::Query, Primitive::Query]);
    Ok(())
}

#[tokio::test]
async fn raw_statements_take_the_row_path() -> Result<(), Box<dyn std::error::Error>> {
    let spy = Spy::new(connect("raw").await?);
    let db = query_builders().apply(spy.clone())?;

    let result = db
        .query_builder()
        .raw(
            r#"INSERT INTO "Model" (value) VALUES (?) RETURNING id"#,
            vec![RowValues::Text("raw".into())],
        )
        .execute()
        .await?;

    assert_eq!(result.rows()[0].to_json(), json!({"id": 1}));
    assert_eq!(spy.primitives(), vec![Primitive::Query]);
    Ok(())
}

#[tokio::test]
async fn compiled_sql_reaches_the_client_verbatim() -> Result<(), Box<dyn std::error::Error>> {
    let spy = Spy::new(connect("verbatim").await?);
    let db = query_builders().apply(spy.clone())?;
    let insert = db.query_builder().insert_into("Model").value("value", "x");

    let first = insert.compile();
    let second = insert.compile();
    assert_eq!(first, second);

    insert.execute().await?;
    assert_eq!(
        spy.calls(),
        vec![(Primitive::Execute, first.sql.clone())]
    );
    Ok(())
}

#[tokio::test]
async fn execution_failures_surface_unchanged_in_kind() -> Result<(), Box<dyn std::error::Error>> {
    let db = query_builders().apply(connect("failures").await?)?;
    let qb = db.query_builder();
    qb.insert_into("Model").value("id", 1_i64).value("value", "a").execute().await?;

    let err = qb
        .insert_into("Model")
        .value("id", 1_i64)
        .value("value", "dup")
        .execute()
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Execution);
    assert!(matches!(err.root(), BridgeError::SqliteError(_)));
    Ok(())
}

#[tokio::test]
async fn double_attachment_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let db = query_builders().apply(connect("double").await?)?;

    let err = query_builders().apply(db.clone()).unwrap_err();
    assert!(matches!(err, BridgeError::AlreadyExtended));

    // The original attachment keeps working.
    db.query_builder().insert_into("Model").value("value", "ok").execute().await?;
    assert_eq!(count_models(&db).await?, 1);
    Ok(())
}

#[tokio::test]
async fn streaming_is_refused() -> Result<(), Box<dyn std::error::Error>> {
    let spy = Spy::new(connect("streaming").await?);
    let db = query_builders().apply(spy.clone())?;

    let err = db
        .query_builder()
        .select_from("Model")
        .stream(10)
        .await
        .err()
        .expect("streaming should be refused");

    assert!(matches!(err, BridgeError::Unsupported(Capability::StreamingQueries)));
    assert_eq!(err.to_string(), "orm-query-bridge does not support streaming queries");
    assert!(spy.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn builder_transactions_are_refused() -> Result<(), Box<dyn std::error::Error>> {
    let spy = Spy::new(connect("builder_tx").await?);
    let db = query_builders().apply(spy.clone())?;

    let err = db
        .query_builder()
        .transaction(TransactionSettings::default(), |qb| async move {
            qb.insert_into("Model").value("value", "never").execute().await?;
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Unsupported(Capability::Transactions)));
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    assert!(spy.calls().is_empty());
    assert_eq!(count_models(&spy).await?, 0);
    Ok(())
}

#[tokio::test]
async fn client_methods_remain_reachable() -> Result<(), Box<dyn std::error::Error>> {
    let client = connect("reachable").await?;
    let db = query_builders().apply(client)?;

    // Through Deref to the wrapped client.
    db.execute_batch(r#"INSERT INTO "Model" (value) VALUES ('a'), ('b');"#)
        .await?;
    assert_eq!(count_models(&db).await?, 2);
    assert_eq!(count_models(db.client()).await?, 2);
    Ok(())
}

#[tokio::test]
async fn delete_reports_count_or_rows_by_returning_clause() -> Result<(), Box<dyn std::error::Error>>
{
    let spy = Spy::new(connect("delete_scenario").await?);
    let seed = r#"INSERT INTO "Model" (id, value) VALUES (1, 'test')"#;
    spy.execute_raw(seed, &[]).await?;
    let db = query_builders().apply(spy.clone())?;
    spy.clear();

    let counted = db
        .query_builder()
        .delete_from("Model")
        .where_eq("id", 1_i64)
        .execute()
        .await?;
    assert_eq!(
        counted,
        QueryResult::Affected {
            num_affected_rows: 1
        }
    );
    assert!(counted.rows().is_empty());

    spy.execute_raw(seed, &[]).await?;
    spy.clear();
    let returned = db
        .query_builder()
        .delete_from("Model")
        .where_eq("id", 1_i64)
        .returning_all()
        .execute()
        .await?;
    let rows: Vec<_> = returned.rows().iter().map(CustomDbRow::to_json).collect();
    assert_eq!(rows, vec![json!({"id": 1, "value": "test"})]);
    assert_eq!(spy.primitives(), vec![Primitive::Query]);
    Ok(())
}
