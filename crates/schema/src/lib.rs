mod mapping;
mod model;
mod order;
mod relation;
mod types;
mod value;

pub use mapping::HostRepr;
pub use model::{Schema, SchemaBuilder, TableSchema};
pub use order::Direction;
pub use relation::{JoinKind, Relation, RelationStep};
pub use types::ColumnType;
pub use value::Value;

/// Errors arising from schema construction and lookups.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("table name must not be empty")]
    EmptyTableName,
    #[error("column name must not be empty in table '{table}'")]
    EmptyColumnName { table: String },
    #[error("unknown table '{0}'")]
    UnknownTable(String),
    #[error("unknown column '{column}' of table '{table}'")]
    UnknownColumn { table: String, column: String },
    #[error("unknown relation '{0}'")]
    UnknownRelation(String),
    #[error("relation '{0}' must have at least one join step")]
    EmptyRelation(String),
}
