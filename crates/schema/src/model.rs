use std::collections::BTreeMap;

use crate::{ColumnType, Relation, SchemaError};

/// TableSchema maps column names to their parsed column types.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TableSchema {
    pub columns: BTreeMap<String, ColumnType>,
}

/// Schema is the immutable description of the tables a query stack may
/// touch: table → column → type, an optional `databases` sub-map for
/// cross-database queries, and a registry of named join relations.
///
/// Schemas are typically deserialized from the artifact emitted by the
/// introspection CLI, and are shared process-wide behind an `Arc`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Schema {
    tables: BTreeMap<String, TableSchema>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    databases: BTreeMap<String, BTreeMap<String, TableSchema>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    relations: BTreeMap<String, Relation>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Load a schema from its JSON artifact.
    pub fn from_json(text: &str) -> Result<Schema, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Resolve a table reference, which may be plain (`orders`) or
    /// database-qualified (`analytics.orders`).
    pub fn table(&self, reference: &str) -> Option<&TableSchema> {
        if let Some((database, table)) = reference.split_once('.') {
            if let Some(found) = self.databases.get(database).and_then(|db| db.get(table)) {
                return Some(found);
            }
        }
        self.tables.get(reference)
    }

    /// Resolve a column type. `column` may itself be qualified as
    /// `table.column`, in which case the embedded table wins over `table`.
    pub fn column_type(&self, table: &str, column: &str) -> Result<&ColumnType, SchemaError> {
        let (table, column) = match column.rsplit_once('.') {
            Some((qualifier, bare)) => (qualifier, bare),
            None => (table, column),
        };
        let table_schema = self
            .table(table)
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))?;

        table_schema
            .columns
            .get(column)
            .ok_or_else(|| SchemaError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })
    }

    pub fn relation(&self, name: &str) -> Result<&Relation, SchemaError> {
        self.relations
            .get(name)
            .ok_or_else(|| SchemaError::UnknownRelation(name.to_string()))
    }

    pub fn tables(&self) -> impl Iterator<Item = (&String, &TableSchema)> {
        self.tables.iter()
    }
}

/// SchemaBuilder assembles an immutable Schema, enforcing the non-empty
/// name invariants at build time.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    tables: BTreeMap<String, TableSchema>,
    databases: BTreeMap<String, BTreeMap<String, TableSchema>>,
    relations: BTreeMap<String, Relation>,
}

impl SchemaBuilder {
    pub fn table<I, C>(mut self, name: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = (C, ColumnType)>,
        C: Into<String>,
    {
        self.tables.insert(
            name.to_string(),
            TableSchema {
                columns: columns
                    .into_iter()
                    .map(|(column, ty)| (column.into(), ty))
                    .collect(),
            },
        );
        self
    }

    pub fn database<I, C>(mut self, database: &str, table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = (C, ColumnType)>,
        C: Into<String>,
    {
        self.databases.entry(database.to_string()).or_default().insert(
            table.to_string(),
            TableSchema {
                columns: columns
                    .into_iter()
                    .map(|(column, ty)| (column.into(), ty))
                    .collect(),
            },
        );
        self
    }

    pub fn relation(mut self, name: &str, relation: Relation) -> Self {
        self.relations.insert(name.to_string(), relation);
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        let all_tables = self
            .tables
            .iter()
            .chain(self.databases.values().flatten());

        for (name, table) in all_tables {
            if name.is_empty() {
                return Err(SchemaError::EmptyTableName);
            }
            for column in table.columns.keys() {
                if column.is_empty() {
                    return Err(SchemaError::EmptyColumnName {
                        table: name.clone(),
                    });
                }
            }
        }
        for (name, relation) in &self.relations {
            if relation.steps.is_empty() {
                return Err(SchemaError::EmptyRelation(name.clone()));
            }
        }

        Ok(Schema {
            tables: self.tables,
            databases: self.databases,
            relations: self.relations,
        })
    }
}
