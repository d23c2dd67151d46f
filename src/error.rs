//! Error types.
//!
//! One flat taxonomy for the whole engine. Failures are never retried or
//! swallowed: any error aborts the diff, and a streaming consumer must
//! treat an error item as the end of the sequence.

/// Error type for the diff engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid parameter combination, rejected before any query runs.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A gateway could not establish a session.
    #[error("connection failed: {0}")]
    Connect(String),

    /// A database rejected a query or returned an unexpected shape.
    #[error("query failed: {0}")]
    Query(String),

    /// No checkpoint key from side 1 exists in side 2, so bisection has
    /// nothing to split on.
    #[error("tables are too different")]
    Divergence,

    /// An internal invariant failed, e.g. child segments not summing to
    /// their parent. Points at non-repeatable reads or a logic bug.
    #[error("consistency check failed: {0}")]
    Consistency(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
