//! Table name in a query.

use pg_query::protobuf::RangeVar;

/// Borrowed view of a statement's target table.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Table<'a> {
    /// Table name.
    pub name: &'a str,
    /// Schema name, if specified.
    pub schema: Option<&'a str>,
    /// Alias.
    pub alias: Option<&'a str>,
}

impl<'a> Table<'a> {
    /// Only bare, unqualified references participate in routing; a
    /// schema-qualified table is forwarded untouched.
    pub fn routable(&self) -> Option<&'a str> {
        match self.schema {
            None => Some(self.name),
            Some(_) => None,
        }
    }
}

impl<'a> From<&'a RangeVar> for Table<'a> {
    fn from(range_var: &'a RangeVar) -> Self {
        Self {
            name: range_var.relname.as_str(),
            schema: if !range_var.schemaname.is_empty() {
                Some(range_var.schemaname.as_str())
            } else {
                None
            },
            alias: range_var
                .alias
                .as_ref()
                .map(|alias| alias.aliasname.as_str()),
        }
    }
}
