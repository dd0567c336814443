//! Value expression extracted from a query.

use pg_query::{
    protobuf::{a_const::Val, AConst},
    Node, NodeEnum,
};

use crate::{datum::Datum, error::Error};

/// A value expression paired with a column, either in a WHERE clause
/// or an INSERT tuple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    String(&'a str),
    Integer(i64),
    Numeric(&'a str),
    Boolean(bool),
    Null,
    Placeholder(i32),
}

impl<'a> Value<'a> {
    /// Resolve a sharding column value. Placeholders index one-based
    /// into the argument vector; string and number literals convert
    /// directly; nothing else can shard a statement.
    pub fn datum(&self, args: &[Datum]) -> Result<Datum, Error> {
        match self {
            Value::Placeholder(number) => bind_arg(*number, args).cloned(),
            Value::String(value) => Ok(Datum::Text((*value).to_owned())),
            Value::Integer(value) => Ok(Datum::Bigint(*value)),
            Value::Numeric(value) => value
                .parse::<i64>()
                .map(Datum::Bigint)
                .or_else(|_| value.parse::<f64>().map(Datum::Double))
                .map_err(|_| Error::NotImplemented),
            _ => Err(Error::NotImplemented),
        }
    }

    /// Resolve a primary key value: a 64-bit integer, bound or literal.
    pub fn id(&self, args: &[Datum]) -> Result<i64, Error> {
        match self {
            Value::Placeholder(number) => {
                bind_arg(*number, args)?.bigint().ok_or(Error::InvalidId)
            }
            Value::Integer(value) => Ok(*value),
            Value::Numeric(value) => value.parse().map_err(|_| Error::InvalidId),
            _ => Err(Error::InvalidId),
        }
    }
}

fn bind_arg(number: i32, args: &[Datum]) -> Result<&Datum, Error> {
    (number as usize)
        .checked_sub(1)
        .and_then(|index| args.get(index))
        .ok_or(Error::MissingBindParameter(number.max(0) as usize))
}

impl<'a> From<&'a AConst> for Value<'a> {
    fn from(value: &'a AConst) -> Self {
        if value.isnull {
            return Value::Null;
        }

        match value.val.as_ref() {
            Some(Val::Ival(int)) => Value::Integer(int.ival as i64),
            Some(Val::Fval(float)) => Value::Numeric(float.fval.as_str()),
            Some(Val::Sval(string)) => Value::String(string.sval.as_str()),
            Some(Val::Boolval(boolean)) => Value::Boolean(boolean.boolval),
            _ => Value::Null,
        }
    }
}

impl<'a> TryFrom<&'a Node> for Value<'a> {
    type Error = ();

    fn try_from(value: &'a Node) -> Result<Self, Self::Error> {
        match &value.node {
            Some(NodeEnum::AConst(a_const)) => Ok(a_const.into()),
            Some(NodeEnum::ParamRef(param_ref)) => Ok(Value::Placeholder(param_ref.number)),
            _ => Err(()),
        }
    }
}
