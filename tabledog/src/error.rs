//! Library error surface.
//!
//! Routing failures are a small closed set of variants so callers can
//! match on the exact condition instead of string-comparing messages.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The statement has no equality on the sharding column and no
    /// usable primary key equality to fall back on.
    #[error("sharding key or id required, and must use the = operator")]
    MissingShardingKey,

    /// An `id = ...` predicate carried something other than a 64-bit
    /// integer.
    #[error("invalid id format")]
    InvalidId,

    /// An INSERT's column list and first VALUES row differ in length.
    /// The grammar accepts this; the database would reject it later,
    /// but routing cannot pair columns with values either way.
    #[error("column names and expressions mismatch")]
    ColumnMismatch,

    /// The statement parsed, but the rewriter does not handle its kind,
    /// or the sharding column's value expression is not a placeholder,
    /// string literal or number literal.
    #[error("statement not supported by the sharding rewriter")]
    NotImplemented,

    /// A positional placeholder referenced an argument that was not
    /// supplied.
    #[error("bind parameter ${0} out of range")]
    MissingBindParameter(usize),

    /// The user-supplied sharding algorithm rejected the value.
    #[error("sharding algorithm error: {0}")]
    Algorithm(String),

    /// The resolver is missing a capability this statement requires.
    #[error("resolver misconfigured: {0}")]
    Config(String),

    #[error("{0}")]
    Keygen(#[from] crate::keygen::Error),

    /// The parser accepted the statement but could not serialize the
    /// rewritten tree back to SQL.
    #[error("{0}")]
    PgQuery(pg_query::Error),

    /// Error surfaced by the underlying connection pool.
    #[error("{0}")]
    Driver(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap a driver error for transport through the pool trait.
    pub fn driver(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Driver(Box::new(err))
    }
}
