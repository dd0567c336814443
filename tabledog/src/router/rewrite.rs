//! Statement rewriting: logical table in, physical shard table out.

use pg_query::{
    protobuf::{a_const::Val, AConst, Float, ParseResult, ResTarget, SelectStmt},
    Node, NodeEnum,
};
use tracing::trace;

use super::{
    parser::{no_sharding_hint, Insert, ShardingKey, Table, WhereClause},
    Router,
};
use crate::{datum::Datum, error::Error};

/// Both textual forms of a routed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    /// Statement still targeting the logical table. For INSERTs with a
    /// filled-in primary key, the added column and value are included.
    pub full_table_query: String,
    /// Statement targeting the physical shard table.
    pub shard_query: String,
    /// Logical table the statement was routed for; `None` when the
    /// statement passed through untouched.
    pub table: Option<String>,
}

impl Rewrite {
    fn passthrough(query: &str) -> Self {
        Self {
            full_table_query: query.to_owned(),
            shard_query: query.to_owned(),
            table: None,
        }
    }
}

/// Where the routing value comes from.
enum Source<'a> {
    Insert(Insert<'a>),
    Condition(Option<&'a Node>),
}

/// Routing decision for one statement.
struct Decision {
    table: String,
    suffix: String,
    fill_id: Option<i64>,
}

/// Rewrite one statement against the router's registry.
///
/// Anything that does not parse is forwarded verbatim: drivers emit
/// session chatter (`SELECT 1` and friends) that is none of our
/// business. Parse errors are therefore not rewrite errors.
pub(crate) fn rewrite(router: &Router, query: &str, args: &[Datum]) -> Result<Rewrite, Error> {
    if router.is_empty() {
        return Ok(Rewrite::passthrough(query));
    }

    let mut ast = match pg_query::parse(query) {
        Ok(ast) => ast,
        Err(err) => {
            trace!("forwarding unparseable statement: {}", err);
            return Ok(Rewrite::passthrough(query));
        }
    };

    let Some(decision) = route(router, &ast.protobuf, query, args)? else {
        return Ok(Rewrite::passthrough(query));
    };

    if let Some(id) = decision.fill_id {
        fill_insert_id(&mut ast.protobuf, id);
    }

    let full_table_query = ast.deparse().map_err(Error::PgQuery)?;

    let physical = format!("{}{}", decision.table, decision.suffix);
    set_table(&mut ast.protobuf, &decision.table, &physical);

    let shard_query = ast.deparse().map_err(Error::PgQuery)?;
    trace!("routed {:?} to {}", decision.table, physical);

    Ok(Rewrite {
        full_table_query,
        shard_query,
        table: Some(decision.table),
    })
}

fn route(
    router: &Router,
    ast: &ParseResult,
    query: &str,
    args: &[Datum],
) -> Result<Option<Decision>, Error> {
    let Some(node) = ast
        .stmts
        .first()
        .and_then(|raw| raw.stmt.as_ref())
        .and_then(|stmt| stmt.node.as_ref())
    else {
        return Ok(None);
    };

    let (table, source) = match node {
        NodeEnum::SelectStmt(stmt) => {
            if no_sharding_hint(query) {
                return Ok(None);
            }

            let Some(table) = single_table(&stmt.from_clause) else {
                return Ok(None);
            };

            (table, Source::Condition(stmt.where_clause.as_deref()))
        }

        NodeEnum::InsertStmt(stmt) => {
            let insert = Insert::new(stmt);

            let Some(table) = insert.table() else {
                return Ok(None);
            };

            (table, Source::Insert(insert))
        }

        NodeEnum::UpdateStmt(stmt) => {
            let Some(table) = stmt.relation.as_ref().map(Table::from) else {
                return Ok(None);
            };

            (table, Source::Condition(stmt.where_clause.as_deref()))
        }

        NodeEnum::DeleteStmt(stmt) => {
            let Some(table) = stmt.relation.as_ref().map(Table::from) else {
                return Ok(None);
            };

            (table, Source::Condition(stmt.where_clause.as_deref()))
        }

        // Transaction control and SET are session chatter drivers send
        // between queries; they never reference a sharded table.
        NodeEnum::TransactionStmt(_) | NodeEnum::VariableSetStmt(_) => return Ok(None),

        _ => return Err(Error::NotImplemented),
    };

    let Some(name) = table.routable() else {
        return Ok(None);
    };

    let Some(resolver) = router.resolver_for(name) else {
        return Ok(None);
    };

    let key = match &source {
        Source::Insert(insert) => ShardingKey {
            value: Some(insert.sharding_value(resolver.sharding_column(), args)?),
            id: None,
        },

        Source::Condition(condition) => {
            WhereClause::new(resolver.sharding_column(), args).extract(*condition)?
        }
    };

    let suffix = if let Some(ref value) = key.value {
        resolver.shard_for(value)?
    } else if let Some(id) = key.id {
        resolver.shard_for_id(id).ok_or_else(|| {
            Error::Config(
                "statement carries only an id and no primary key algorithm is configured".into(),
            )
        })?
    } else {
        return Err(Error::MissingShardingKey);
    };

    let fill_id = match &source {
        Source::Insert(insert) if !insert.has_column("id") => {
            let shard_index = shard_index_from_suffix(&suffix)?;
            let id = resolver.generate_id(shard_index).ok_or_else(|| {
                Error::Config(
                    "INSERTs without an id column require a primary key generator".into(),
                )
            })?;

            Some(id)
        }

        _ => None,
    };

    Ok(Some(Decision {
        table: name.to_owned(),
        suffix,
        fill_id,
    }))
}

/// The single table of a FROM clause. Joins and subqueries are not
/// routed.
fn single_table(from_clause: &[Node]) -> Option<Table<'_>> {
    if from_clause.len() != 1 {
        return None;
    }

    if let Some(NodeEnum::RangeVar(ref var)) = from_clause[0].node {
        return Some(Table::from(var));
    }

    None
}

/// Suffixes are caller-defined, but primary key generation needs the
/// numeric shard index back out of one: `_<decimal>`.
fn shard_index_from_suffix(suffix: &str) -> Result<i64, Error> {
    suffix
        .strip_prefix('_')
        .unwrap_or(suffix)
        .parse()
        .map_err(|_| Error::Config(format!("sharding suffix {:?} is not numeric", suffix)))
}

/// Append `id` and a generated key to the insert's first VALUES row.
fn fill_insert_id(ast: &mut ParseResult, id: i64) {
    let Some(node) = ast
        .stmts
        .first_mut()
        .and_then(|raw| raw.stmt.as_mut())
        .and_then(|stmt| stmt.node.as_mut())
    else {
        return;
    };

    let NodeEnum::InsertStmt(insert) = node else {
        return;
    };

    insert.cols.push(Node {
        node: Some(NodeEnum::ResTarget(Box::new(ResTarget {
            name: "id".into(),
            ..Default::default()
        }))),
    });

    let Some(select) = insert.select_stmt.as_mut() else {
        return;
    };

    let Some(NodeEnum::SelectStmt(select_stmt)) = select.node.as_mut() else {
        return;
    };

    if let Some(first) = select_stmt.values_lists.first_mut() {
        if let Some(NodeEnum::List(list)) = first.node.as_mut() {
            list.items.push(Node {
                node: Some(NodeEnum::AConst(AConst {
                    val: Some(Val::Fval(Float {
                        fval: id.to_string(),
                    })),
                    ..Default::default()
                })),
            });
        }
    }
}

/// Point the statement's table reference at the physical shard table.
fn set_table(ast: &mut ParseResult, logical: &str, physical: &str) {
    let Some(node) = ast
        .stmts
        .first_mut()
        .and_then(|raw| raw.stmt.as_mut())
        .and_then(|stmt| stmt.node.as_mut())
    else {
        return;
    };

    match node {
        NodeEnum::InsertStmt(stmt) => {
            if let Some(relation) = stmt.relation.as_mut() {
                relation.relname = physical.into();
            }
        }

        NodeEnum::UpdateStmt(stmt) => {
            if let Some(relation) = stmt.relation.as_mut() {
                relation.relname = physical.into();
            }
        }

        NodeEnum::DeleteStmt(stmt) => {
            if let Some(relation) = stmt.relation.as_mut() {
                relation.relname = physical.into();
            }
        }

        NodeEnum::SelectStmt(stmt) => {
            for from in stmt.from_clause.iter_mut() {
                if let Some(NodeEnum::RangeVar(var)) = from.node.as_mut() {
                    if var.relname == logical {
                        var.relname = physical.into();
                    }
                }
            }

            rewrite_order_by(stmt, logical, physical);
        }

        _ => (),
    }
}

/// `ORDER BY orders.id` must follow the table rename.
fn rewrite_order_by(stmt: &mut SelectStmt, logical: &str, physical: &str) {
    for sort in stmt.sort_clause.iter_mut() {
        let Some(NodeEnum::SortBy(sort_by)) = sort.node.as_mut() else {
            continue;
        };

        let Some(expr) = sort_by.node.as_mut() else {
            continue;
        };

        let Some(NodeEnum::ColumnRef(column)) = expr.node.as_mut() else {
            continue;
        };

        if column.fields.len() != 2 {
            continue;
        }

        if let Some(NodeEnum::String(qualifier)) = column.fields[0].node.as_mut() {
            if qualifier.sval == logical {
                qualifier.sval = physical.into();
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{keygen, router::Resolver};

    // Fixed millisecond so assertions are exact.
    fn id_for_shard(shard: i64) -> i64 {
        (1 << 40) | (shard << 7) | 1
    }

    fn router() -> Router {
        let resolver = Resolver::new("user_id", |value: &Datum| {
            let user_id = match value {
                Datum::Bigint(user_id) => *user_id,
                Datum::Text(text) => text
                    .parse()
                    .map_err(|_| Error::Algorithm(format!("invalid user_id: {:?}", text)))?,
                _ => return Err(Error::Algorithm("invalid user_id".into())),
            };

            Ok(format!("_{:02}", user_id % 4))
        })
        .with_primary_key_algorithm(|id| format!("_{:02}", keygen::shard_index(id)))
        .with_primary_key_generator(id_for_shard);

        Router::new([("orders", resolver)])
    }

    fn resolve(query: &str, args: &[Datum]) -> Result<Rewrite, Error> {
        rewrite(&router(), query, args)
    }

    #[test]
    fn test_insert_fills_id() {
        let result = resolve(
            "INSERT INTO orders (user_id, product) VALUES ($1, $2)",
            &[Datum::Bigint(100), Datum::Text("iPhone".into())],
        )
        .unwrap();

        let id = id_for_shard(0);
        assert_eq!(
            result.shard_query,
            format!("INSERT INTO orders_00 (user_id, product, id) VALUES ($1, $2, {})", id)
        );
        assert_eq!(
            result.full_table_query,
            format!("INSERT INTO orders (user_id, product, id) VALUES ($1, $2, {})", id)
        );
        assert_eq!(result.table.as_deref(), Some("orders"));
    }

    #[test]
    fn test_insert_with_id_keeps_values() {
        let result = resolve(
            "INSERT INTO orders (user_id, product, id) VALUES ($1, $2, $3)",
            &[
                Datum::Bigint(101),
                Datum::Text("iPhone".into()),
                Datum::Bigint(id_for_shard(1)),
            ],
        )
        .unwrap();

        assert_eq!(
            result.shard_query,
            "INSERT INTO orders_01 (user_id, product, id) VALUES ($1, $2, $3)"
        );
        assert_eq!(
            result.full_table_query,
            "INSERT INTO orders (user_id, product, id) VALUES ($1, $2, $3)"
        );
    }

    #[test]
    fn test_insert_literal_key() {
        let result = resolve("INSERT INTO orders (user_id) VALUES (3)", &[]).unwrap();
        assert!(result
            .shard_query
            .starts_with("INSERT INTO orders_03 (user_id, id) VALUES (3, "));
    }

    #[test]
    fn test_insert_missing_key() {
        let result = resolve(
            "INSERT INTO orders (product) VALUES ($1)",
            &[Datum::Text("iPad".into())],
        );
        assert!(matches!(result, Err(Error::MissingShardingKey)));
    }

    #[test]
    fn test_insert_column_value_mismatch() {
        let result = resolve("INSERT INTO orders (product, user_id) VALUES ('x')", &[]);
        assert!(matches!(result, Err(Error::ColumnMismatch)));
    }

    #[test]
    fn test_select_by_key_and_id() {
        let result = resolve(
            "SELECT * FROM orders WHERE user_id = $1 AND id = $2",
            &[Datum::Bigint(101), Datum::Bigint(id_for_shard(1))],
        )
        .unwrap();

        assert_eq!(
            result.shard_query,
            "SELECT * FROM orders_01 WHERE user_id = $1 AND id = $2"
        );
    }

    #[test]
    fn test_select_by_id_only() {
        let result = resolve(
            "SELECT * FROM orders WHERE id = $1",
            &[Datum::Bigint(id_for_shard(2))],
        )
        .unwrap();

        assert_eq!(result.shard_query, "SELECT * FROM orders_02 WHERE id = $1");
    }

    #[test]
    fn test_no_sharding_hint() {
        let query = "SELECT /* nosharding */ * FROM orders WHERE user_id = $1";
        let result = resolve(query, &[Datum::Bigint(101)]).unwrap();

        assert_eq!(result.shard_query, query);
        assert_eq!(result.table, None);
    }

    #[test]
    fn test_update() {
        let result = resolve(
            "UPDATE orders SET product = $1 WHERE user_id = $2",
            &[Datum::Text("x".into()), Datum::Bigint(100)],
        )
        .unwrap();

        assert_eq!(
            result.shard_query,
            "UPDATE orders_00 SET product = $1 WHERE user_id = $2"
        );
        assert_eq!(
            result.full_table_query,
            "UPDATE orders SET product = $1 WHERE user_id = $2"
        );
    }

    #[test]
    fn test_delete() {
        let result = resolve(
            "DELETE FROM orders WHERE user_id = $1",
            &[Datum::Bigint(100)],
        )
        .unwrap();

        assert_eq!(result.shard_query, "DELETE FROM orders_00 WHERE user_id = $1");
    }

    #[test]
    fn test_delete_missing_key() {
        let result = resolve(
            "DELETE FROM orders WHERE product = $1",
            &[Datum::Text("iPad".into())],
        );
        assert!(matches!(result, Err(Error::MissingShardingKey)));
    }

    #[test]
    fn test_select_one_passthrough() {
        let result = resolve("SELECT 1", &[]).unwrap();
        assert_eq!(result.shard_query, "SELECT 1");
        assert_eq!(result.table, None);
    }

    #[test]
    fn test_order_by_follows_rename() {
        let result = resolve(
            "SELECT * FROM orders WHERE user_id = 101 ORDER BY orders.id",
            &[],
        )
        .unwrap();

        assert_eq!(
            result.shard_query,
            "SELECT * FROM orders_01 WHERE user_id = 101 ORDER BY orders_01.id"
        );
    }

    #[test]
    fn test_unqualified_order_by_untouched() {
        let result = resolve("SELECT * FROM orders WHERE user_id = 101 ORDER BY id", &[]).unwrap();

        assert_eq!(
            result.shard_query,
            "SELECT * FROM orders_01 WHERE user_id = 101 ORDER BY id"
        );
    }

    #[test]
    fn test_unregistered_table_passthrough() {
        let query = "SELECT * FROM categories WHERE id = $1";
        let result = resolve(query, &[Datum::Bigint(1)]).unwrap();

        assert_eq!(result.shard_query, query);
        assert_eq!(result.table, None);
    }

    #[test]
    fn test_qualified_table_passthrough() {
        let query = r#"SELECT * FROM "public"."orders" WHERE user_id = 101"#;
        let result = resolve(query, &[]).unwrap();

        assert_eq!(result.shard_query, query);
        assert_eq!(result.table, None);
    }

    #[test]
    fn test_physical_table_never_double_suffixed() {
        let query = "SELECT * FROM orders_01 WHERE user_id = 101";
        let result = resolve(query, &[]).unwrap();

        assert_eq!(result.shard_query, query);
    }

    #[test]
    fn test_non_equality_rejected() {
        let result = resolve("SELECT * FROM orders WHERE user_id <> 101", &[]);
        assert!(matches!(result, Err(Error::MissingShardingKey)));

        let result = resolve(
            "SELECT * FROM orders WHERE user_id > $1 AND id > $2",
            &[Datum::Bigint(101), Datum::Bigint(100)],
        );
        assert!(matches!(result, Err(Error::MissingShardingKey)));
    }

    #[test]
    fn test_key_equality_with_id_inequality() {
        let result = resolve(
            "SELECT * FROM orders WHERE user_id = $1 AND id > $2",
            &[Datum::Bigint(101), Datum::Bigint(100)],
        )
        .unwrap();

        assert_eq!(
            result.shard_query,
            "SELECT * FROM orders_01 WHERE user_id = $1 AND id > $2"
        );
    }

    #[test]
    fn test_id_equality_with_key_inequality() {
        let result = resolve(
            "SELECT * FROM orders WHERE id = $1 AND user_id > $2",
            &[Datum::Bigint(id_for_shard(1)), Datum::Bigint(100)],
        )
        .unwrap();

        assert_eq!(
            result.shard_query,
            "SELECT * FROM orders_01 WHERE id = $1 AND user_id > $2"
        );
    }

    #[test]
    fn test_algorithm_error_propagated() {
        let result = resolve(
            "SELECT * FROM orders WHERE user_id = $1",
            &[Datum::Text("not a number".into())],
        );

        match result {
            Err(Error::Algorithm(message)) => assert!(message.contains("not a number")),
            other => panic!("expected algorithm error, got {:?}", other.map(|r| r.shard_query)),
        }
    }

    #[test]
    fn test_unsupported_statement() {
        let result = resolve("TRUNCATE orders", &[]);
        assert!(matches!(result, Err(Error::NotImplemented)));
    }

    #[test]
    fn test_transaction_chatter_passthrough() {
        for query in ["BEGIN", "COMMIT", "ROLLBACK", "SET TIME ZONE 'UTC'"] {
            let result = resolve(query, &[]).unwrap();
            assert_eq!(result.shard_query, query);
            assert_eq!(result.table, None);
        }
    }

    #[test]
    fn test_unparseable_passthrough() {
        let query = "SELECT FROM WHERE ORDER";
        let result = resolve(query, &[]).unwrap();

        assert_eq!(result.shard_query, query);
        assert_eq!(result.table, None);
    }

    #[test]
    fn test_id_only_requires_primary_key_algorithm() {
        let router = Router::new([(
            "orders",
            Resolver::new("user_id", |value| {
                Ok(format!("_{:02}", value.bigint().unwrap_or(0) % 4))
            }),
        )]);

        let result = rewrite(
            &router,
            "SELECT * FROM orders WHERE id = $1",
            &[Datum::Bigint(id_for_shard(1))],
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_fill_requires_generator() {
        let router = Router::new([(
            "orders",
            Resolver::new("user_id", |value| {
                Ok(format!("_{:02}", value.bigint().unwrap_or(0) % 4))
            }),
        )]);

        let result = rewrite(
            &router,
            "INSERT INTO orders (user_id) VALUES ($1)",
            &[Datum::Bigint(100)],
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_fill_requires_numeric_suffix() {
        let router = Router::new([(
            "orders",
            Resolver::new("user_id", |_| Ok("_primary".into()))
                .with_primary_key_generator(|_| 1),
        )]);

        let result = rewrite(
            &router,
            "INSERT INTO orders (user_id) VALUES ($1)",
            &[Datum::Bigint(100)],
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_registry_short_circuits() {
        let router = Router::new(Vec::<(String, Resolver)>::new());
        let result = rewrite(&router, "not even sql", &[]).unwrap();

        assert_eq!(result.shard_query, "not even sql");
    }
}
