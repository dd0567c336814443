//! Statement inspection for the sharding rewriter.

pub mod comment;
pub mod insert;
pub mod table;
pub mod value;
pub mod where_clause;

pub use comment::no_sharding_hint;
pub use insert::Insert;
pub use table::Table;
pub use value::Value;
pub use where_clause::{ShardingKey, WhereClause};
