//! Point-in-time feature store query planning and execution.
//!
//! A catalog describes named feature groups — tables keyed by an entity
//! column, optionally carrying an event-timestamp axis. Given a request for
//! columns across one or more groups and a snapshot moment, this crate plans
//! one subquery per group (selecting the latest row per entity as of that
//! moment), composes the subqueries into a single multi-view query, and
//! renders it to parameterized SQL text for a target dialect. The
//! [`driver`] module binds the rendered query to a `sqlx::Any` connection,
//! streams results in bounded-memory chunks, and optionally joins them back
//! onto a caller-supplied entity dataframe.
//!
//! No module upstream of [`render`] touches SQL text or a database
//! connection — see [`ast`] for the immutable query representation that
//! the [`planner`] and [`composer`] build and only [`render`] turns into
//! text.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pit_features::catalog::{Catalog, GroupMeta};
//! use pit_features::dialect::Postgres;
//! use pit_features::driver::{Driver, ExportOptions};
//! use pit_features::request::parse_feature_list;
//!
//! # async fn example(pool: &sqlx::AnyPool) -> anyhow::Result<()> {
//! let catalog = Catalog::new().with_group(
//!     "orders",
//!     GroupMeta {
//!         entity_column: "user_id".into(),
//!         event_timestamp_column: Some("event_timestamp".into()),
//!         create_timestamp_column: None,
//!         entity_value_type: None,
//!     },
//! );
//! let driver = Driver::new(pool, Arc::new(catalog), Arc::new(Postgres));
//! let features = parse_feature_list("orders.total, orders.currency")?;
//! let preview = driver
//!     .export(&features, None, ExportOptions::new(), None)
//!     .await?;
//! println!("{preview}");
//! # Ok(())
//! # }
//! ```

/// Catalog data model: entities, features, and feature groups.
pub mod types;

/// Error taxonomy surfaced to callers.
pub mod error;

/// Read-only feature-group metadata lookup.
pub mod catalog;

/// Parses `group.column` feature request tokens.
pub mod request;

/// SQL Dialect Adapter: capability bits and rendering hooks per backend.
pub mod dialect;

/// The immutable query AST shared by the planner, composer, and renderer.
pub mod ast;

/// FeatureView Planner: plans a single group's point-in-time subquery.
pub mod planner;

/// FeatureGroup Composer: joins planned views into one composed query.
pub mod composer;

/// Renders a composed query to dialect-specific, parameterized SQL.
pub mod render;

/// Output sinks (CSV, markdown preview) and the column-merge helpers the
/// execution driver uses when joining results back onto a caller's data.
pub mod sink;

/// Execution Driver: binds, streams, and joins.
pub mod driver;

pub use error::{PitError, Result};
