//! Per-table sharding configuration.

use std::fmt;
use std::sync::Arc;

use crate::{datum::Datum, error::Error};

/// Maps a sharding column value to the shard table suffix.
pub type ShardingAlgorithm = Arc<dyn Fn(&Datum) -> Result<String, Error> + Send + Sync>;

/// Maps a primary key to the shard table suffix. Used when a statement
/// carries no sharding key.
pub type PrimaryKeyAlgorithm = Arc<dyn Fn(i64) -> String + Send + Sync>;

/// Generates a primary key for an INSERT that does not provide one.
pub type PrimaryKeyGenerator = Arc<dyn Fn(i64) -> i64 + Send + Sync>;

/// How one logical table shards. Immutable after registration.
#[derive(Clone)]
pub struct Resolver {
    sharding_column: String,
    algorithm: ShardingAlgorithm,
    algorithm_by_primary_key: Option<PrimaryKeyAlgorithm>,
    primary_key_generate: Option<PrimaryKeyGenerator>,
    enable_full_table: bool,
}

impl Resolver {
    /// Create a resolver sharding on `column`, e.g. splitting an order
    /// table by `user_id`:
    ///
    /// ```
    /// use tabledog::{Datum, Error, Resolver};
    ///
    /// let resolver = Resolver::new("user_id", |value| match value.bigint() {
    ///     Some(user_id) => Ok(format!("_{:02}", user_id % 4)),
    ///     None => Err(Error::Algorithm("user_id must be an integer".into())),
    /// });
    /// ```
    pub fn new(
        column: impl Into<String>,
        algorithm: impl Fn(&Datum) -> Result<String, Error> + Send + Sync + 'static,
    ) -> Self {
        Self {
            sharding_column: column.into(),
            algorithm: Arc::new(algorithm),
            algorithm_by_primary_key: None,
            primary_key_generate: None,
            enable_full_table: false,
        }
    }

    /// Route statements that only carry a primary key equality, for keys
    /// that embed the shard index (see [`crate::keygen`]).
    pub fn with_primary_key_algorithm(
        mut self,
        algorithm: impl Fn(i64) -> String + Send + Sync + 'static,
    ) -> Self {
        self.algorithm_by_primary_key = Some(Arc::new(algorithm));
        self
    }

    /// Generate primary keys for INSERTs that omit the `id` column.
    pub fn with_primary_key_generator(
        mut self,
        generator: impl Fn(i64) -> i64 + Send + Sync + 'static,
    ) -> Self {
        self.primary_key_generate = Some(Arc::new(generator));
        self
    }

    /// Mirror writes to the unsharded logical table, best effort.
    pub fn with_full_table(mut self) -> Self {
        self.enable_full_table = true;
        self
    }

    /// Column whose value picks the shard.
    pub fn sharding_column(&self) -> &str {
        &self.sharding_column
    }

    pub fn enable_full_table(&self) -> bool {
        self.enable_full_table
    }

    /// Suffix for a sharding column value.
    pub fn shard_for(&self, value: &Datum) -> Result<String, Error> {
        (self.algorithm)(value)
    }

    /// Suffix for a primary key, when configured.
    pub fn shard_for_id(&self, id: i64) -> Option<String> {
        self.algorithm_by_primary_key
            .as_ref()
            .map(|algorithm| algorithm(id))
    }

    /// New primary key for the given shard index, when configured.
    pub fn generate_id(&self, shard_index: i64) -> Option<i64> {
        self.primary_key_generate
            .as_ref()
            .map(|generate| generate(shard_index))
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("sharding_column", &self.sharding_column)
            .field(
                "algorithm_by_primary_key",
                &self.algorithm_by_primary_key.is_some(),
            )
            .field("primary_key_generate", &self.primary_key_generate.is_some())
            .field("enable_full_table", &self.enable_full_table)
            .finish()
    }
}
