//! Connection pool interceptor.
//!
//! [`ShardingPool`] wraps whatever pool the host framework hands us and
//! routes every outbound statement through the rewriter before the
//! driver sees it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::{datum::Datum, error::Error, router::Rewrite, sharding::Sharding};

/// One result row, one datum per selected column.
pub type Row = Vec<Datum>;

/// The driver boundary. Statements carry positional placeholders
/// (`$1`, `$2`, ...) matched by the argument vector.
///
/// Transaction control defaults to no-ops; pools that support
/// transactions override the methods.
#[async_trait]
pub trait ConnPool: Send + Sync {
    async fn prepare(&self, query: &str) -> Result<(), Error>;

    /// Execute a statement, returning the number of affected rows.
    async fn exec(&self, query: &str, args: &[Datum]) -> Result<u64, Error>;

    /// Execute a query, returning all rows.
    async fn query(&self, query: &str, args: &[Datum]) -> Result<Vec<Row>, Error>;

    /// Execute a query expected to return at most one row.
    async fn query_row(&self, query: &str, args: &[Datum]) -> Result<Option<Row>, Error>;

    async fn begin(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn commit(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn rollback(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Routing interceptor around the real connection pool.
///
/// Rewrite failures abort the operation: the driver never sees a
/// statement the router refused.
pub struct ShardingPool {
    inner: Arc<dyn ConnPool>,
    sharding: Arc<Sharding>,
}

impl ShardingPool {
    pub fn new(inner: Arc<dyn ConnPool>, sharding: Arc<Sharding>) -> Self {
        Self { inner, sharding }
    }

    pub fn sharding(&self) -> &Arc<Sharding> {
        &self.sharding
    }

    /// Best-effort duplicate write to the unsharded logical table.
    /// The mirror's result and error are discarded.
    async fn mirror(&self, rewrite: &Rewrite, args: &[Datum]) {
        let Some(ref table) = rewrite.table else {
            return;
        };

        let Some(resolver) = self.sharding.router().resolver_for(table) else {
            return;
        };

        if !resolver.enable_full_table() {
            return;
        }

        if let Err(err) = self.inner.exec(&rewrite.full_table_query, args).await {
            debug!("full table mirror failed: {}", err);
        }
    }
}

#[async_trait]
impl ConnPool for ShardingPool {
    /// Prepared statements are forwarded untouched; rewriting happens
    /// when the statement executes with its arguments.
    async fn prepare(&self, query: &str) -> Result<(), Error> {
        self.inner.prepare(query).await
    }

    async fn exec(&self, query: &str, args: &[Datum]) -> Result<u64, Error> {
        let rewrite = self.sharding.resolve(query, args)?;
        self.sharding.record_query(&rewrite.shard_query);
        self.mirror(&rewrite, args).await;

        self.inner.exec(&rewrite.shard_query, args).await
    }

    /// The diagnostic slot records the statement as the caller wrote
    /// it; the driver receives the rewritten form. The mirror write
    /// goes through `exec` and its rows are discarded.
    async fn query(&self, query: &str, args: &[Datum]) -> Result<Vec<Row>, Error> {
        let rewrite = self.sharding.resolve(query, args)?;
        self.sharding.record_query(query);
        self.mirror(&rewrite, args).await;

        self.inner.query(&rewrite.shard_query, args).await
    }

    async fn query_row(&self, query: &str, args: &[Datum]) -> Result<Option<Row>, Error> {
        let rewrite = self.sharding.resolve(query, args)?;
        self.sharding.record_query(&rewrite.shard_query);

        self.inner.query_row(&rewrite.shard_query, args).await
    }

    async fn begin(&self) -> Result<(), Error> {
        self.inner.begin().await
    }

    async fn commit(&self) -> Result<(), Error> {
        self.inner.commit().await
    }

    async fn rollback(&self) -> Result<(), Error> {
        self.inner.rollback().await
    }

    async fn ping(&self) -> Result<(), Error> {
        Ok(())
    }
}
