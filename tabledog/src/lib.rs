//! Client-side table sharding middleware.
//!
//! tabledog sits between an application's data-access layer and its
//! SQL driver. Statements that target a registered logical table are
//! rewritten to target a physical shard table, picked by the value of
//! the table's sharding column (or, as a fallback, by a primary key
//! that embeds the shard index — see [`keygen`]).
//!
//! ```
//! use tabledog::{Datum, Error, Resolver, Sharding};
//!
//! let sharding = Sharding::register([(
//!     "orders",
//!     Resolver::new("user_id", |value| match value.bigint() {
//!         Some(user_id) => Ok(format!("_{:02}", user_id % 4)),
//!         None => Err(Error::Algorithm("user_id must be an integer".into())),
//!     }),
//! )]);
//!
//! let rewrite = sharding
//!     .resolve("SELECT * FROM orders WHERE user_id = $1", &[Datum::Bigint(6)])
//!     .unwrap();
//!
//! assert_eq!(rewrite.shard_query, "SELECT * FROM orders_02 WHERE user_id = $1");
//! ```
//!
//! Wrap a [`ConnPool`] with [`Sharding::initialize`] to route every
//! outbound statement automatically.

pub mod datum;
pub mod error;
pub mod keygen;
pub mod pool;
pub mod router;
pub mod sharding;

pub use datum::Datum;
pub use error::Error;
pub use pool::{ConnPool, Row, ShardingPool};
pub use router::{Resolver, Rewrite, Router};
pub use sharding::Sharding;
