//! Table reflection against live sandbox databases.
//!
//! Requires Docker (or PG_SANDBOX_HOST). Enable with:
//!   cargo test --features docker-tests -- --test-threads=1

#![cfg(feature = "docker-tests")]

mod common;

use pg_sandbox::{get_table, SandboxError};

#[tokio::test]
async fn test_reflects_columns_in_declaration_order() {
    let sandbox = common::sandbox().await;

    sandbox
        .run(|db| async move {
            let users = db.get_table("users", None).await.unwrap();

            assert_eq!(users.schema, "public");
            assert_eq!(users.name, "users");
            assert_eq!(users.column_names(), vec!["id", "name", "age", "password"]);

            let id = users.column("id").unwrap();
            assert_eq!(id.data_type, "integer");
            assert!(!id.nullable);
            assert_eq!(id.ordinal_position, 1);

            let name = users.column("name").unwrap();
            assert_eq!(name.data_type, "character varying");
            assert!(name.nullable);
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_expected_columns_must_match_order() {
    let sandbox = common::sandbox().await;

    sandbox
        .run(|db| async move {
            db.get_table("users", Some(&["id", "name", "age", "password"][..]))
                .await
                .unwrap();

            let err = db
                .get_table("users", Some(&["id", "age", "name", "password"][..]))
                .await
                .unwrap_err();
            match err {
                SandboxError::SchemaMismatch {
                    table,
                    expected,
                    actual,
                } => {
                    assert_eq!(table, "users");
                    assert_eq!(expected, vec!["id", "age", "name", "password"]);
                    assert_eq!(actual, vec!["id", "name", "age", "password"]);
                },
                other => panic!("expected SchemaMismatch, got {other:?}"),
            }
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_expected_columns_must_match_membership() {
    let sandbox = common::sandbox().await;

    sandbox
        .run(|db| async move {
            let err = get_table(db.pool(), "users", Some(&["id", "name", "age"][..]))
                .await
                .unwrap_err();
            assert!(matches!(err, SandboxError::SchemaMismatch { .. }));
            assert!(!err.is_setup_error());
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unknown_table_is_reported() {
    let sandbox = common::sandbox().await;

    sandbox
        .run(|db| async move {
            let err = db.get_table("orders", None).await.unwrap_err();
            assert!(matches!(err, SandboxError::TableNotFound(ref t) if t == "public.orders"));
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reflection_sees_tables_created_by_the_test() {
    let sandbox = common::sandbox().await;

    sandbox
        .run(|db| async move {
            sqlx::raw_sql(
                "CREATE SCHEMA audit; \
                 CREATE TABLE audit.events (id bigserial, payload jsonb NOT NULL);",
            )
            .execute(db.pool())
            .await
            .unwrap();

            let events = db
                .get_table("audit.events", Some(&["id", "payload"][..]))
                .await
                .unwrap();
            assert_eq!(events.schema, "audit");
            assert_eq!(events.column("payload").unwrap().data_type, "jsonb");
            assert_eq!(events.qualified_name(), "\"audit\".\"events\"");
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_table_handle_is_stale_after_release() {
    let sandbox = common::sandbox().await;

    let db = sandbox
        .run(|db| async move {
            db.get_table("users", None).await.unwrap();
            db
        })
        .await
        .unwrap();

    let err = db.get_table("users", None).await.unwrap_err();
    assert!(matches!(err, SandboxError::DatabaseError(sqlx::Error::PoolClosed)));
}
