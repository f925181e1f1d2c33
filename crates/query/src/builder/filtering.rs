use std::sync::Arc;

use filters::{validate_and_coerce, Conjunction, FilterCondition, Operator};
use schema::Value;

use crate::config::WhereItem;
use crate::{QueryError, Shared};

use super::QueryBuilder;

/// Validate a condition against the first visible table that knows its
/// column. Qualified references resolve through their own table; bare
/// references try the base table first, then joined tables.
pub(crate) fn validate_against(
    shared: &Shared,
    tables: &[String],
    condition: &mut FilterCondition,
) -> Result<(), QueryError> {
    let mut first_error = None;

    for table in tables {
        match validate_and_coerce(condition, Some(&shared.schema), Some(table)) {
            Ok(()) => return Ok(()),
            Err(err @ filters::FilterError::Schema(_)) => {
                // The column isn't known to this table; try the next.
                first_error.get_or_insert(err);
            }
            Err(err) => return Err(err.into()),
        }
    }
    match first_error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

impl QueryBuilder {
    /// Add an AND condition. Invalid operator/value combinations fail here,
    /// before any SQL is produced.
    pub fn and_where(
        mut self,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Result<Self, QueryError> {
        self.push_condition(FilterCondition::new(column, operator, value))?;
        Ok(self)
    }

    /// Add an OR condition.
    pub fn or_where(
        mut self,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Result<Self, QueryError> {
        self.push_condition(FilterCondition::new(column, operator, value).or())?;
        Ok(self)
    }

    /// `column BETWEEN min AND max`.
    pub fn where_between(
        self,
        column: &str,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> Result<Self, QueryError> {
        self.and_where(
            column,
            Operator::Between,
            Value::Array(vec![min.into(), max.into()]),
        )
    }

    /// Open a parenthesized group joined with AND.
    pub fn and_where_group<F>(self, build: F) -> Result<Self, QueryError>
    where
        F: FnOnce(GroupBuilder) -> Result<GroupBuilder, QueryError>,
    {
        self.where_group(Conjunction::And, build)
    }

    /// Open a parenthesized group joined with OR.
    pub fn or_where_group<F>(self, build: F) -> Result<Self, QueryError>
    where
        F: FnOnce(GroupBuilder) -> Result<GroupBuilder, QueryError>,
    {
        self.where_group(Conjunction::Or, build)
    }

    fn where_group<F>(mut self, conjunction: Conjunction, build: F) -> Result<Self, QueryError>
    where
        F: FnOnce(GroupBuilder) -> Result<GroupBuilder, QueryError>,
    {
        let group = build(GroupBuilder {
            shared: self.shared.clone(),
            tables: self.visible_tables(),
            items: Vec::new(),
        })?;

        // An empty group renders nothing.
        if group.items.is_empty() {
            return Ok(self);
        }

        self.push_where(WhereItem::GroupStart { conjunction });
        for item in group.items {
            self.push_where(item);
        }
        self.push_where(WhereItem::GroupEnd);
        Ok(self)
    }
}

/// GroupBuilder collects the conditions of one parenthesized group,
/// validating each against the parent builder's visible tables. Groups
/// nest arbitrarily.
pub struct GroupBuilder {
    shared: Arc<Shared>,
    tables: Vec<String>,
    items: Vec<WhereItem>,
}

impl GroupBuilder {
    pub fn and_where(
        mut self,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Result<Self, QueryError> {
        let mut condition = FilterCondition::new(column, operator, value);
        validate_against(&self.shared, &self.tables, &mut condition)?;
        self.items.push(WhereItem::Condition(condition));
        Ok(self)
    }

    pub fn or_where(
        mut self,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Result<Self, QueryError> {
        let mut condition = FilterCondition::new(column, operator, value).or();
        validate_against(&self.shared, &self.tables, &mut condition)?;
        self.items.push(WhereItem::Condition(condition));
        Ok(self)
    }

    pub fn and_where_group<F>(self, build: F) -> Result<Self, QueryError>
    where
        F: FnOnce(GroupBuilder) -> Result<GroupBuilder, QueryError>,
    {
        self.nested(Conjunction::And, build)
    }

    pub fn or_where_group<F>(self, build: F) -> Result<Self, QueryError>
    where
        F: FnOnce(GroupBuilder) -> Result<GroupBuilder, QueryError>,
    {
        self.nested(Conjunction::Or, build)
    }

    fn nested<F>(mut self, conjunction: Conjunction, build: F) -> Result<Self, QueryError>
    where
        F: FnOnce(GroupBuilder) -> Result<GroupBuilder, QueryError>,
    {
        let group = build(GroupBuilder {
            shared: self.shared.clone(),
            tables: self.tables.clone(),
            items: Vec::new(),
        })?;

        if group.items.is_empty() {
            return Ok(self);
        }
        self.items.push(WhereItem::GroupStart { conjunction });
        self.items.extend(group.items);
        self.items.push(WhereItem::GroupEnd);
        Ok(self)
    }
}
