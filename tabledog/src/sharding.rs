//! Registration surface and per-instance state.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::{
    datum::Datum,
    error::Error,
    pool::{ConnPool, ShardingPool},
    router::{rewrite, Resolver, Rewrite, Router},
};

/// The sharding middleware. Holds the routing registry, built once at
/// registration, and a diagnostic slot with the most recent routed
/// query.
pub struct Sharding {
    router: Router,
    last_query: ArcSwap<String>,
}

impl Sharding {
    /// Build the middleware from `(logical table, resolver)` pairs.
    pub fn register<T, I>(resolvers: I) -> Self
    where
        T: Into<String>,
        I: IntoIterator<Item = (T, Resolver)>,
    {
        Self {
            router: Router::new(resolvers),
            last_query: ArcSwap::from_pointee(String::new()),
        }
    }

    /// Component name, for host frameworks that identify middleware by
    /// name.
    pub fn name(&self) -> &'static str {
        "tabledog:sharding"
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Rewrite one statement, returning the full-table and shard-table
    /// forms. This is the parsing entry point the pool wrapper uses; it
    /// is public so routing can be exercised without a driver.
    pub fn resolve(&self, query: &str, args: &[Datum]) -> Result<Rewrite, Error> {
        rewrite::rewrite(&self.router, query, args)
    }

    /// Most recent query this instance routed. Snapshots only; useful
    /// for tests and debugging, not for control flow.
    pub fn last_query(&self) -> String {
        self.last_query.load().as_ref().clone()
    }

    pub(crate) fn record_query(&self, query: &str) {
        self.last_query.store(Arc::new(query.to_owned()));
    }

    /// Wrap the framework's connection pool with the routing
    /// interceptor. The returned pool replaces the original at the
    /// call sites the host framework exposes.
    pub fn initialize(self: Arc<Self>, pool: Arc<dyn ConnPool>) -> ShardingPool {
        ShardingPool::new(pool, self)
    }
}
