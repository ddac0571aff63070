//! Shared fixture helpers for the end-to-end driver tests (spec.md §8).
//! Builds an in-memory SQLite pool — the one dialect `sqlx::Any` can run
//! against without an external server — and seeds it with the `test`/
//! `test1` tables used across the scenario tests.
//!
//! Event/create timestamp columns are stored as RFC3339 `TEXT`, matching how
//! `sqlx` encodes a bound `chrono::DateTime<Utc>` against SQLite: the
//! lexicographic ordering of same-format RFC3339 strings agrees with
//! chronological order, so `<=` comparisons against the bound snapshot
//! parameter behave correctly.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use pit_features::catalog::{Catalog, GroupMeta};
use pit_features::dialect::Sqlite;
use pit_features::types::ValueType;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

pub async fn memory_pool() -> Result<AnyPool> {
    sqlx::any::install_default_drivers();
    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

/// Maps a small integer "logical instant" onto a distinct RFC3339 moment,
/// so fixture rows can be written using the scenario tables' small integer
/// timestamps (spec.md §8) while the underlying column stays a real instant.
pub fn instant(n: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(n * 86_400, 0).single().unwrap()
}

/// Like [`instant`] but accepts a fractional day count, for the entity-driven
/// join scenario's fractional per-row snapshots (spec.md §8 scenario 5).
pub fn instant_frac(days: f64) -> DateTime<Utc> {
    Utc.timestamp_opt((days * 86_400.0) as i64, 0).single().unwrap()
}

/// `test(a, b, c)`: entity `a`, event timestamp `b`, feature `c`.
pub async fn create_test_table(pool: &AnyPool) -> Result<()> {
    sqlx::query("CREATE TABLE test (a INTEGER, b TEXT, c TEXT)")
        .execute(pool)
        .await?;
    Ok(())
}

/// `test(a, b, b1, c)`: adds a create-timestamp column `b1` for tie-break
/// scenarios.
pub async fn create_test_table_with_create_ts(pool: &AnyPool) -> Result<()> {
    sqlx::query("CREATE TABLE test (a INTEGER, b TEXT, b1 TEXT, c TEXT)")
        .execute(pool)
        .await?;
    Ok(())
}

/// `test1(a, d, e)`: entity `a`, event timestamp `d`, feature `e`.
pub async fn create_test1_table(pool: &AnyPool) -> Result<()> {
    sqlx::query("CREATE TABLE test1 (a INTEGER, d TEXT, e TEXT)")
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_test_row(pool: &AnyPool, a: i64, b: i64, c: &str) -> Result<()> {
    sqlx::query("INSERT INTO test (a, b, c) VALUES (?, ?, ?)")
        .bind(a)
        .bind(instant(b).to_rfc3339())
        .bind(c)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_test_row_with_create_ts(
    pool: &AnyPool,
    a: i64,
    b: i64,
    b1: i64,
    c: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO test (a, b, b1, c) VALUES (?, ?, ?, ?)")
        .bind(a)
        .bind(instant(b).to_rfc3339())
        .bind(instant(b1).to_rfc3339())
        .bind(c)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_test1_row(pool: &AnyPool, a: i64, d: i64, e: &str) -> Result<()> {
    sqlx::query("INSERT INTO test1 (a, d, e) VALUES (?, ?, ?)")
        .bind(a)
        .bind(instant(d).to_rfc3339())
        .bind(e)
        .execute(pool)
        .await?;
    Ok(())
}

pub fn catalog_test_test1() -> Catalog {
    Catalog::new()
        .with_group(
            "test",
            GroupMeta {
                entity_column: "a".into(),
                event_timestamp_column: Some("b".into()),
                create_timestamp_column: None,
                entity_value_type: Some(ValueType::Int),
            },
        )
        .with_group(
            "test1",
            GroupMeta {
                entity_column: "a".into(),
                event_timestamp_column: Some("d".into()),
                create_timestamp_column: None,
                entity_value_type: Some(ValueType::Int),
            },
        )
}

pub fn catalog_test_with_create_ts() -> Catalog {
    Catalog::new().with_group(
        "test",
        GroupMeta {
            entity_column: "a".into(),
            event_timestamp_column: Some("b".into()),
            create_timestamp_column: Some("b1".into()),
            entity_value_type: Some(ValueType::Int),
        },
    )
}

/// A single-group catalog for `test(a, b, c)` with `b` as the
/// event-timestamp column, used by the entity-driven join scenarios (the
/// per-row snapshot moment comes from the caller's entity frame, not from
/// `JoinOptions::snapshot`, but the group itself is still time-varying).
pub fn catalog_single_test_with_b() -> Catalog {
    Catalog::new().with_group(
        "test",
        GroupMeta {
            entity_column: "a".into(),
            event_timestamp_column: Some("b".into()),
            create_timestamp_column: None,
            entity_value_type: Some(ValueType::Int),
        },
    )
}

pub fn catalog_no_event_ts() -> Catalog {
    Catalog::new().with_group(
        "test",
        GroupMeta {
            entity_column: "a".into(),
            event_timestamp_column: None,
            create_timestamp_column: None,
            entity_value_type: Some(ValueType::Int),
        },
    )
}

pub fn dialect() -> Arc<Sqlite> {
    Arc::new(Sqlite)
}

pub fn far_future_snapshot() -> DateTime<Utc> {
    "2999-01-01T00:00:00Z".parse().unwrap()
}
