//! Error taxonomy surfaced to callers (spec.md §6/§7).

use thiserror::Error;

/// Errors surfaced by the planner, composer, and execution driver.
#[derive(Error, Debug)]
pub enum PitError {
    #[error("unknown feature group: {0}")]
    UnknownGroup(String),

    #[error("invalid feature token: {0:?}")]
    InvalidFeatureToken(String),

    #[error("dialect does not support this request: {0}")]
    DialectUnsupported(String),

    #[error("backend query failed: {source}\nsql: {sql}")]
    BackendFailure {
        sql: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("result would spill multiple batches without a sink or force_fetch_all")]
    UnboundedSpillRequired,

    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PitError>;
