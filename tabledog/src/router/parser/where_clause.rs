//! WHERE clause of a SELECT/UPDATE/DELETE statement.

use pg_query::{
    protobuf::{AExpr, AExprKind},
    Node, NodeEnum,
};

use super::Value;
use crate::{datum::Datum, error::Error};

/// Routing inputs collected from a predicate tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingKey {
    /// Right-hand side of a `<sharding column> = <value>` equality.
    pub value: Option<Datum>,
    /// Right-hand side of an `id = <value>` equality.
    pub id: Option<i64>,
}

impl ShardingKey {
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.id.is_none()
    }
}

/// Predicate walker for one statement.
pub struct WhereClause<'a> {
    column: &'a str,
    args: &'a [Datum],
}

impl<'a> WhereClause<'a> {
    pub fn new(column: &'a str, args: &'a [Datum]) -> Self {
        Self { column, args }
    }

    /// Visit every binary expression in the predicate and collect the
    /// sharding column and primary key equalities. Both may appear in
    /// one statement; non-equality operators never count.
    pub fn extract(&self, condition: Option<&Node>) -> Result<ShardingKey, Error> {
        let mut key = ShardingKey::default();

        if let Some(node) = condition {
            self.walk(node, &mut key)?;
        }

        Ok(key)
    }

    fn walk(&self, node: &Node, key: &mut ShardingKey) -> Result<(), Error> {
        match node.node {
            Some(NodeEnum::BoolExpr(ref expr)) => {
                for arg in &expr.args {
                    self.walk(arg, key)?;
                }
            }

            Some(NodeEnum::AExpr(ref expr)) => {
                self.binary(expr, key)?;

                if let Some(ref left) = expr.lexpr {
                    self.walk(left, key)?;
                }

                if let Some(ref right) = expr.rexpr {
                    self.walk(right, key)?;
                }
            }

            _ => (),
        }

        Ok(())
    }

    fn binary(&self, expr: &AExpr, key: &mut ShardingKey) -> Result<(), Error> {
        if expr.kind() != AExprKind::AexprOp || operator(expr) != Some("=") {
            return Ok(());
        }

        let Some(column) = expr.lexpr.as_deref().and_then(column_name) else {
            return Ok(());
        };

        let Some(right) = expr.rexpr.as_deref() else {
            return Ok(());
        };

        if column == self.column {
            let value = Value::try_from(right).map_err(|_| Error::NotImplemented)?;
            key.value = Some(value.datum(self.args)?);
        } else if column == "id" {
            let value = Value::try_from(right).map_err(|_| Error::InvalidId)?;
            key.id = Some(value.id(self.args)?);
        }

        Ok(())
    }
}

fn operator(expr: &AExpr) -> Option<&str> {
    expr.name.first().and_then(|node| match node.node {
        Some(NodeEnum::String(ref op)) => Some(op.sval.as_str()),
        _ => None,
    })
}

/// Unqualified column reference; qualified references never match the
/// sharding column.
fn column_name(node: &Node) -> Option<&str> {
    if let Some(NodeEnum::ColumnRef(ref column)) = node.node {
        if column.fields.len() == 1 {
            if let Some(NodeEnum::String(ref name)) = column.fields[0].node {
                return Some(name.sval.as_str());
            }
        }
    }

    None
}
