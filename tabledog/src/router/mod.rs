//! Statement router.

pub mod parser;
pub mod resolver;
pub mod rewrite;

pub use resolver::Resolver;
pub use rewrite::Rewrite;

use fnv::FnvHashMap;

/// Registry mapping logical table names to resolvers. Built once at
/// registration, read-only while serving.
#[derive(Debug, Clone, Default)]
pub struct Router {
    resolvers: FnvHashMap<String, Resolver>,
}

impl Router {
    pub fn new<T, I>(resolvers: I) -> Self
    where
        T: Into<String>,
        I: IntoIterator<Item = (T, Resolver)>,
    {
        Self {
            resolvers: resolvers
                .into_iter()
                .map(|(table, resolver)| (table.into(), resolver))
                .collect(),
        }
    }

    /// Resolver registered for a logical table. Absence means the
    /// statement is not sharded and passes through unchanged.
    pub fn resolver_for(&self, table: &str) -> Option<&Resolver> {
        self.resolvers.get(table)
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}
