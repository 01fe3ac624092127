//! SQLite driver integration tests against temporary database files.
#![cfg(feature = "sqlite")]

use anyhow::Result;
use shardline_common::config::RetrySettings;
use shardline_connectors::{connector_for, Connection};
use shardline_error::ErrorCode;
use shardline_sql::{args, Statement, Value};
use std::sync::Arc;
use tempfile::NamedTempFile;

async fn open_temp(node: &str) -> Result<(NamedTempFile, Arc<dyn Connection>)> {
    let temp_db = NamedTempFile::new()?;
    let path = temp_db.path().to_str().unwrap().to_string();
    let conn = connector_for("sqlite", RetrySettings::default())?
        .connect(node, &path)
        .await?;
    conn.execute(
        "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, age INTEGER)",
        &[],
    )
    .await?;
    Ok((temp_db, conn))
}

#[tokio::test]
async fn test_execute_and_query() -> Result<()> {
    let (_db, conn) = open_temp("g1_master").await?;

    let first = conn
        .execute("INSERT INTO users (name, age) VALUES (?, ?)", &args!["Alice", 30])
        .await?;
    assert_eq!(first.rows_affected, 1);
    assert_eq!(first.last_insert_id, Some(1));

    let second = conn
        .execute("INSERT INTO users (name, age) VALUES (?, ?)", &args!["Bob", Value::Null])
        .await?;
    assert_eq!(second.last_insert_id, Some(2));

    let rows = conn
        .query("SELECT id, name, age FROM users ORDER BY id", &[])
        .await?;
    assert_eq!(rows.columns, vec!["id", "name", "age"]);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.rows[0], args![1, "Alice", 30]);
    assert_eq!(rows.rows[1][2], Value::Null);

    let count = conn.query("SELECT count(1) FROM users", &[]).await?;
    assert_eq!(count.scalar(), Some(&Value::Int(2)));
    Ok(())
}

#[tokio::test]
async fn test_batch_is_atomic() -> Result<()> {
    let (_db, conn) = open_temp("g1_master").await?;

    let ok = conn
        .execute_batch(&[
            Statement::new("INSERT INTO users (name) VALUES (?)", args!["a"]),
            Statement::new("INSERT INTO users (name) VALUES (?)", args!["b"]),
        ])
        .await?;
    assert_eq!(ok.rows_affected, 2);

    let err = conn
        .execute_batch(&[
            Statement::new("INSERT INTO users (name) VALUES (?)", args!["c"]),
            Statement::new("INSERT INTO users (name) VALUES (?)", args![Value::Null]),
        ])
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ExecutionFailed);

    let count = conn.query("SELECT count(1) FROM users", &[]).await?;
    assert_eq!(count.scalar(), Some(&Value::Int(2)));
    Ok(())
}

#[tokio::test]
async fn test_transaction_commit_and_rollback() -> Result<()> {
    let (_db, conn) = open_temp("g1_master").await?;

    let mut tx = conn.begin().await?;
    tx.execute("INSERT INTO users (name) VALUES (?)", &args!["kept"])
        .await?;
    let inside = tx.query("SELECT count(1) FROM users", &[]).await?;
    assert_eq!(inside.scalar(), Some(&Value::Int(1)));
    tx.commit().await?;

    let mut tx = conn.begin().await?;
    tx.execute("INSERT INTO users (name) VALUES (?)", &args!["dropped"])
        .await?;
    tx.rollback().await?;

    {
        let mut abandoned = conn.begin().await?;
        abandoned
            .execute("INSERT INTO users (name) VALUES (?)", &args!["abandoned"])
            .await?;
    }

    let rows = conn.query("SELECT name FROM users", &[]).await?;
    assert_eq!(rows.rows, vec![args!["kept"]]);
    Ok(())
}

#[tokio::test]
async fn test_closed_connection_is_reported() -> Result<()> {
    let (_db, conn) = open_temp("g2_slave").await?;
    conn.close().await?;
    conn.close().await?;

    let err = conn.query("SELECT 1", &[]).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotConnected);
    assert!(err.message.contains("g2_slave"));
    Ok(())
}
