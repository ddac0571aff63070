//! End-to-end `join` scenarios (spec.md §8): entity-driven Mode B join and
//! the entity-list batching cap.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use pit_features::ast::BindValue;
use pit_features::dialect::SqlDialect;
use pit_features::driver::{Driver, EntityFrame, JoinOptions};
use pit_features::request::parse_feature_list;

fn str_at(frame: &EntityFrame, row: usize, col: &str) -> String {
    let idx = frame.column_index(col).unwrap();
    match &frame.rows[row][idx] {
        BindValue::Str(s) => s.clone(),
        BindValue::Int(i) => i.to_string(),
        BindValue::Float(f) => f.to_string(),
        BindValue::Timestamp(t) => t.to_rfc3339(),
    }
}

/// Scenario 5: entity-driven join, Mode B (per-row point-in-time).
#[tokio::test]
async fn entity_driven_join_mode_b() -> Result<()> {
    let pool = common::memory_pool().await?;
    common::create_test_table(&pool).await?;
    common::insert_test_row(&pool, 1, 2, "b").await?;
    common::insert_test_row(&pool, 1, 3, "c").await?;

    let catalog = Arc::new(common::catalog_single_test_with_b());
    let driver = Driver::new(&pool, catalog, common::dialect());
    let features = parse_feature_list("test.c")?;

    let entity_frame = EntityFrame {
        columns: vec!["a".into(), "snapshot".into()],
        rows: vec![
            vec![BindValue::Int(1), BindValue::Timestamp(common::instant_frac(0.9))],
            vec![BindValue::Int(1), BindValue::Timestamp(common::instant_frac(2.2))],
            vec![BindValue::Int(1), BindValue::Timestamp(common::instant_frac(2.8))],
            vec![BindValue::Int(1), BindValue::Timestamp(common::instant_frac(3.0))],
        ],
    };

    let mut options = JoinOptions::new("a");
    options.event_timestamp_column = Some("snapshot".into());
    let merged = driver.join(&entity_frame, &features, None, options, None).await?;

    assert_eq!(merged.rows.len(), 4);
    assert_eq!(str_at(&merged, 0, "c"), "");
    assert_eq!(str_at(&merged, 1, "c"), "b");
    assert_eq!(str_at(&merged, 2, "c"), "b");
    assert_eq!(str_at(&merged, 3, "c"), "c");
    Ok(())
}

/// A dialect wrapper used only to exercise a small `max_in_list` in the
/// batching-cap scenario, without changing any other SQLite capability.
#[derive(Debug, Clone, Copy)]
struct SmallInList(usize);

impl SqlDialect for SmallInList {
    fn supports_window_rank(&self) -> bool {
        false
    }
    fn supports_full_outer_join(&self) -> bool {
        false
    }
    fn max_in_list(&self) -> usize {
        self.0
    }
    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Scenario 6: batching cap. 7 entity keys against `max_in_list = 3`
/// produces the same merged result as an unrestricted baseline, and no
/// batch's `IN`-list can exceed `max_in_list` (enforced by
/// `Driver::join_chunks`'s `batch_cap` derivation from `max_in_list`).
#[tokio::test]
async fn batching_cap_matches_unrestricted_baseline() -> Result<()> {
    let pool = common::memory_pool().await?;
    common::create_test_table(&pool).await?;
    for a in 1..=7 {
        common::insert_test_row(&pool, a, 1, &format!("v{a}")).await?;
    }

    let catalog = Arc::new(common::catalog_single_test_with_b());
    let features = parse_feature_list("test.c")?;
    let entity_frame = EntityFrame {
        columns: vec!["a".into()],
        rows: (1..=7).map(|a| vec![BindValue::Int(a)]).collect(),
    };

    let small_driver = Driver::new(&pool, catalog.clone(), Arc::new(SmallInList(3)));
    let mut small_options = JoinOptions::new("a");
    small_options.snapshot = Some(common::far_future_snapshot());
    small_options.force_fetch_all = true;
    let small = small_driver
        .join(&entity_frame, &features, None, small_options, None)
        .await?;

    let baseline_driver = Driver::new(&pool, catalog, common::dialect());
    let mut baseline_options = JoinOptions::new("a");
    baseline_options.snapshot = Some(common::far_future_snapshot());
    let baseline = baseline_driver
        .join(&entity_frame, &features, None, baseline_options, None)
        .await?;

    let as_set = |frame: &EntityFrame| -> HashSet<(String, String)> {
        (0..frame.rows.len())
            .map(|i| (str_at(frame, i, "a"), str_at(frame, i, "c")))
            .collect()
    };
    assert_eq!(as_set(&small), as_set(&baseline));
    assert_eq!(small.rows.len(), 7);
    Ok(())
}

/// spec.md §4.5/§8 "Batch safety": when a `join` call needs more than one
/// entity-key chunk and neither `force_fetch_all` nor a sink is set, it
/// must fail with `UnboundedSpillRequired`. Uses 1,100 entity keys (over
/// the ≤1000-row auto-force threshold, spec.md §4.5) against
/// `max_in_list = 500` so two chunks are required; each chunk would return
/// at most 500 rows, far under `chunk_size`, so a check keyed on
/// `stream_query`'s internal row-streaming batch count (as opposed to the
/// entity-key chunk count) would never fire.
#[tokio::test]
async fn unbounded_spill_required_when_more_than_one_entity_chunk_without_sink() -> Result<()> {
    use pit_features::PitError;

    let pool = common::memory_pool().await?;
    common::create_test_table(&pool).await?;

    let catalog = Arc::new(common::catalog_single_test_with_b());
    let features = parse_feature_list("test.c")?;
    let entity_frame = EntityFrame {
        columns: vec!["a".into()],
        rows: (1..=1100).map(BindValue::Int).map(|v| vec![v]).collect(),
    };

    let driver = Driver::new(&pool, catalog, Arc::new(SmallInList(500)));
    let mut options = JoinOptions::new("a");
    options.snapshot = Some(common::far_future_snapshot());
    let err = driver
        .join(&entity_frame, &features, None, options, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PitError::UnboundedSpillRequired));
    Ok(())
}

/// spec.md §4.5: a requested feature column whose name collides with an
/// existing entity-frame column is suffix-disambiguated only to detect the
/// collision, then dropped — the entity frame's own column survives
/// untouched, not the backend's value (`original_source/spellbook/
/// feature_store.py`'s `keep_cols` filter after the `suffixes=(None, "_y")`
/// merge).
#[tokio::test]
async fn colliding_feature_column_is_dropped_not_renamed() -> Result<()> {
    let pool = common::memory_pool().await?;
    common::create_test_table(&pool).await?;
    common::insert_test_row(&pool, 1, 1, "from_backend").await?;

    let catalog = Arc::new(common::catalog_single_test_with_b());
    let driver = Driver::new(&pool, catalog, common::dialect());
    let features = parse_feature_list("test.c")?;

    let entity_frame = EntityFrame {
        columns: vec!["a".into(), "c".into()],
        rows: vec![vec![BindValue::Int(1), BindValue::Str("from_entity_frame".into())]],
    };

    let mut options = JoinOptions::new("a");
    options.snapshot = Some(common::far_future_snapshot());
    let merged = driver.join(&entity_frame, &features, None, options, None).await?;

    assert_eq!(merged.columns, vec!["a".to_string(), "c".to_string()]);
    assert_eq!(merged.rows.len(), 1);
    assert_eq!(str_at(&merged, 0, "c"), "from_entity_frame");
    Ok(())
}
