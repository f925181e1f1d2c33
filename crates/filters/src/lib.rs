//! Schema-typed, composable predicate algebra, decoupled from query
//! construction. A filter tree built here is later rewritten into a query
//! builder's WHERE stream by the cross-filter feature.

mod builder;
mod condition;
mod ranges;
mod validate;

pub use builder::{CrossFilter, TopN};
pub use condition::{Conjunction, FilterCondition, FilterNode, Operator};
pub use ranges::NamedRange;
pub use validate::validate_and_coerce;

/// Errors arising from filter construction and schema validation.
/// These surface synchronously, before any SQL is rendered.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("unknown date range '{0}'")]
    UnknownRange(String),
    #[error("operator {operator} on column '{column}' requires a sequence value")]
    ExpectsSequence { column: String, operator: String },
    #[error("between on column '{column}' requires exactly two non-null endpoints")]
    BadBetween { column: String },
    #[error("tuple membership on column '{column}' requires tuples of equal arity")]
    BadTupleArity { column: String },
    #[error("column '{column}' of type {column_type} does not admit ordering comparisons")]
    NotOrderable { column: String, column_type: String },
    #[error("value {value} is not valid for column '{column}' of type {column_type}")]
    TypeMismatch {
        column: String,
        column_type: String,
        value: String,
    },
    #[error("invalid date value '{0}'")]
    InvalidDate(String),
    #[error(transparent)]
    Schema(#[from] schema::SchemaError),
}
