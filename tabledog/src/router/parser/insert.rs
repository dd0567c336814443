//! INSERT statement handling.

use pg_query::{protobuf::InsertStmt, Node, NodeEnum};

use super::{Table, Value};
use crate::{datum::Datum, error::Error};

/// Borrowed view of an `INSERT` statement.
#[derive(Debug)]
pub struct Insert<'a> {
    stmt: &'a InsertStmt,
}

impl<'a> Insert<'a> {
    pub fn new(stmt: &'a InsertStmt) -> Self {
        Self { stmt }
    }

    /// Insert target, if specified (should always be).
    pub fn table(&self) -> Option<Table<'a>> {
        self.stmt.relation.as_ref().map(Table::from)
    }

    /// Column names in statement order.
    pub fn columns(&self) -> Vec<&'a str> {
        self.stmt
            .cols
            .iter()
            .filter_map(|col| {
                if let Some(NodeEnum::ResTarget(ref target)) = col.node {
                    if !target.name.is_empty() {
                        return Some(target.name.as_str());
                    }
                }

                None
            })
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns().iter().any(|column| *column == name)
    }

    /// First row of the VALUES list. `INSERT ... SELECT` has none.
    fn first_row(&self) -> Option<&'a [Node]> {
        if let Some(ref select) = self.stmt.select_stmt {
            if let Some(NodeEnum::SelectStmt(ref stmt)) = select.node {
                if let Some(first) = stmt.values_lists.first() {
                    if let Some(NodeEnum::List(ref list)) = first.node {
                        return Some(&list.items);
                    }
                }
            }
        }

        None
    }

    /// Extract the sharding column's value from the first VALUES row.
    pub fn sharding_value(&self, column: &str, args: &[Datum]) -> Result<Datum, Error> {
        let columns = self.columns();
        let row = self.first_row().ok_or(Error::NotImplemented)?;

        // The grammar accepts mismatched lists; values cannot be paired
        // with columns until the database rejects the statement, so the
        // router rejects it first.
        if columns.len() != row.len() {
            return Err(Error::ColumnMismatch);
        }

        let node = columns
            .iter()
            .position(|name| *name == column)
            .and_then(|position| row.get(position))
            .ok_or(Error::MissingShardingKey)?;

        Value::try_from(node)
            .map_err(|_| Error::NotImplemented)?
            .datum(args)
    }
}
