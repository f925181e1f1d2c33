use filters::{Conjunction, FilterCondition};
use schema::{Direction, JoinKind, Value};

use crate::expr::{AliasedExpr, Expr};

/// One item of the select list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// A plain or qualified column reference.
    Column(String),
    Expr(Expr),
    Aliased(AliasedExpr),
}

impl SelectItem {
    pub fn render(&self) -> String {
        match self {
            SelectItem::Column(name) => name.clone(),
            SelectItem::Expr(expr) => expr.sql.clone(),
            SelectItem::Aliased(aliased) => format!("{} AS {}", aliased.sql, aliased.alias),
        }
    }
}

/// A registered join, rendered in registration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: Option<String>,
    pub left: String,
    pub right: String,
}

/// One item of the flattened WHERE stream. Group markers nest strictly;
/// the formatter inserts a conjunction before an item only when it neither
/// opens the stream nor directly follows a group start.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereItem {
    Condition(FilterCondition),
    /// A pre-rendered predicate fragment with its parameters.
    Raw {
        sql: String,
        params: Vec<Value>,
        conjunction: Conjunction,
    },
    GroupStart {
        conjunction: Conjunction,
    },
    GroupEnd,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub column: String,
    pub direction: Direction,
}

/// A common table expression: `WITH alias AS (sql)`. Parameters bound by
/// the subquery precede all others in positional order.
#[derive(Debug, Clone, PartialEq)]
pub struct CteDef {
    pub alias: String,
    pub sql: String,
    pub params: Vec<Value>,
}

/// QueryConfig is the immutable snapshot a builder composes and the
/// formatter renders. Every builder operation produces a new logical
/// configuration; `clone()` yields an independent copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryConfig {
    pub table: String,
    pub select: Vec<SelectItem>,
    pub aggregates: Vec<AliasedExpr>,
    pub distinct: bool,
    pub joins: Vec<Join>,
    pub where_stream: Vec<WhereItem>,
    pub group_by: Vec<String>,
    pub having: Vec<(String, Vec<Value>)>,
    pub order_by: Vec<OrderTerm>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub ctes: Vec<CteDef>,
    pub settings: Vec<(String, String)>,
    /// When set, rendering returns this text verbatim.
    pub raw_sql: Option<String>,
}

impl QueryConfig {
    pub fn for_table(table: &str) -> QueryConfig {
        QueryConfig {
            table: table.to_string(),
            ..QueryConfig::default()
        }
    }

    /// The GROUP BY the formatter renders: the explicit list, or, when
    /// aggregates are present without one, the selected non-aggregated
    /// columns.
    pub fn effective_group_by(&self) -> Vec<String> {
        if !self.group_by.is_empty() || self.aggregates.is_empty() {
            return self.group_by.clone();
        }
        self.select
            .iter()
            .filter_map(|item| match item {
                SelectItem::Column(name) => Some(name.clone()),
                SelectItem::Aliased(aliased) => Some(aliased.alias.clone()),
                SelectItem::Expr(_) => None,
            })
            .collect()
    }
}
