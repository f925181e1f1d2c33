use std::sync::Arc;

use chrono::{Local, TimeZone};
use schema::{Direction, Schema, Value};

use crate::{
    ranges, validate::validate_and_coerce, Conjunction, FilterCondition, FilterError, FilterNode,
    NamedRange, Operator,
};

/// TopN captures an ordering-plus-limit hint carried by a filter, applied
/// to any builder the filter is composed onto.
#[derive(Debug, Clone, PartialEq)]
pub struct TopN {
    pub column: String,
    pub n: u64,
    pub direction: Direction,
}

/// CrossFilter is a reusable predicate tree, optionally schema-validated,
/// that can be applied across multiple query builders.
///
/// Construction is chainable and fail-fast: the first invalid leaf returns
/// its error and no SQL is ever rendered from an invalid tree.
#[derive(Debug, Clone, Default)]
pub struct CrossFilter {
    schema: Option<Arc<Schema>>,
    table: Option<String>,
    operator: Conjunction,
    children: Vec<FilterNode>,
    top_n: Option<TopN>,
}

impl CrossFilter {
    /// An unvalidated filter; structural rules still apply.
    pub fn new() -> CrossFilter {
        CrossFilter::default()
    }

    /// A schema-validated filter over `table`: every added leaf is checked
    /// against the column's type and the operator's shape rules.
    pub fn for_table(schema: Arc<Schema>, table: &str) -> CrossFilter {
        CrossFilter {
            schema: Some(schema),
            table: Some(table.to_string()),
            ..CrossFilter::default()
        }
    }

    /// Switch the top-level conjunction (default AND).
    pub fn with_operator(mut self, operator: Conjunction) -> CrossFilter {
        self.operator = operator;
        self
    }

    pub fn add(
        self,
        column: &str,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Result<CrossFilter, FilterError> {
        self.add_condition(FilterCondition::new(column, operator, value))
    }

    pub fn add_condition(mut self, mut condition: FilterCondition) -> Result<CrossFilter, FilterError> {
        validate_and_coerce(&mut condition, self.schema.as_deref(), self.table.as_deref())?;
        self.children.push(FilterNode::Condition(condition));
        Ok(self)
    }

    pub fn add_multiple(
        mut self,
        conditions: Vec<FilterCondition>,
    ) -> Result<CrossFilter, FilterError> {
        for condition in conditions {
            self = self.add_condition(condition)?;
        }
        Ok(self)
    }

    /// Add a nested group. Conditions within are validated recursively.
    pub fn add_group(
        mut self,
        operator: Conjunction,
        children: Vec<FilterNode>,
    ) -> Result<CrossFilter, FilterError> {
        let mut group = FilterNode::Group { operator, children };
        self.validate_node(&mut group)?;
        self.children.push(group);
        Ok(self)
    }

    pub fn top_n(mut self, column: &str, n: u64, direction: Direction) -> CrossFilter {
        self.top_n = Some(TopN {
            column: column.to_string(),
            n,
            direction,
        });
        self
    }

    /// Add a `between` over a named relative range ('today', 'last_7_days',
    /// 'this_month', ...). Unknown names fail with `UnknownRange`.
    pub fn add_date_range(self, column: &str, range: &str) -> Result<CrossFilter, FilterError> {
        let range: NamedRange = range.parse()?;
        let (start, end) = range.resolve(Local::now());
        self.add_between_instants(
            column,
            start.with_timezone(&chrono::Utc),
            end.with_timezone(&chrono::Utc),
        )
    }

    pub fn last_n_days(self, column: &str, n: u32) -> Result<CrossFilter, FilterError> {
        let today = Local::now().date_naive();
        let start = today - chrono::Duration::days(n.saturating_sub(1) as i64);
        let end = today + chrono::Duration::days(1);

        let start = Local
            .from_local_datetime(&start.and_hms_opt(0, 0, 0).unwrap())
            .earliest()
            .unwrap_or_else(|| Local::now())
            .with_timezone(&chrono::Utc);
        let end = Local
            .from_local_datetime(&end.and_hms_opt(0, 0, 0).unwrap())
            .earliest()
            .unwrap_or_else(|| Local::now())
            .with_timezone(&chrono::Utc)
            - chrono::Duration::milliseconds(1);

        self.add_between_instants(column, start, end)
    }

    /// Add a `between` over the window immediately preceding `[start, end]`
    /// with identical duration.
    pub fn add_comparison_period(
        self,
        column: &str,
        period: [&str; 2],
    ) -> Result<CrossFilter, FilterError> {
        let start = ranges::parse_date(period[0])?;
        let end = ranges::parse_date(period[1])?;
        let (prev_start, prev_end) = ranges::comparison_period(start, end);
        self.add_between_instants(column, prev_start, prev_end)
    }

    /// Add a `between` over `[start, end]` shifted back one year, with
    /// leap-day windows rolling forward to March 1st.
    pub fn add_year_over_year(
        self,
        column: &str,
        period: [&str; 2],
    ) -> Result<CrossFilter, FilterError> {
        let start = ranges::parse_date(period[0])?;
        let end = ranges::parse_date(period[1])?;
        let (prev_start, prev_end) = ranges::year_over_year(start, end);
        self.add_between_instants(column, prev_start, prev_end)
    }

    /// The assembled tree: a single group under the top-level operator.
    pub fn root(&self) -> FilterNode {
        FilterNode::Group {
            operator: self.operator,
            children: self.children.clone(),
        }
    }

    pub fn top_n_hint(&self) -> Option<&TopN> {
        self.top_n.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn add_between_instants(
        self,
        column: &str,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    ) -> Result<CrossFilter, FilterError> {
        self.add_condition(FilterCondition::new(
            column,
            Operator::Between,
            Value::Array(vec![
                Value::String(ranges::to_iso(start)),
                Value::String(ranges::to_iso(end)),
            ]),
        ))
    }

    fn validate_node(&self, node: &mut FilterNode) -> Result<(), FilterError> {
        match node {
            FilterNode::Condition(condition) => {
                validate_and_coerce(condition, self.schema.as_deref(), self.table.as_deref())
            }
            FilterNode::Group { children, .. } => {
                for child in children {
                    self.validate_node(child)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use schema::ColumnType as CT;

    fn test_schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder()
                .table(
                    "orders",
                    [
                        ("region", CT::String),
                        ("price", CT::Float64),
                        ("status", CT::String),
                        ("placed_at", CT::DateTime { timezone: None }),
                    ],
                )
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn chained_construction_builds_the_expected_tree() {
        let filter = CrossFilter::for_table(test_schema(), "orders")
            .with_operator(Conjunction::Or)
            .add("region", Operator::Eq, "North")
            .unwrap()
            .add_group(
                Conjunction::And,
                vec![
                    FilterNode::condition("price", Operator::Gte, 100i64),
                    FilterNode::condition("price", Operator::Lte, 200i64),
                ],
            )
            .unwrap();

        match filter.root() {
            FilterNode::Group { operator, children } => {
                assert_eq!(operator, Conjunction::Or);
                assert_eq!(children.len(), 2);
                assert!(matches!(children[0], FilterNode::Condition(_)));
                assert!(matches!(children[1], FilterNode::Group { .. }));
            }
            _ => panic!("root must be a group"),
        }
    }

    #[test]
    fn nested_group_children_are_validated() {
        let err = CrossFilter::for_table(test_schema(), "orders")
            .add_group(
                Conjunction::Or,
                vec![FilterNode::condition("price", Operator::Eq, "not a number")],
            )
            .unwrap_err();
        assert!(matches!(err, FilterError::TypeMismatch { .. }));
    }

    #[test]
    fn date_range_stores_canonical_iso_between() {
        let filter = CrossFilter::for_table(test_schema(), "orders")
            .add_date_range("placed_at", "today")
            .unwrap();

        let FilterNode::Group { children, .. } = filter.root() else {
            panic!()
        };
        let FilterNode::Condition(condition) = &children[0] else {
            panic!()
        };
        assert_eq!(condition.operator, Operator::Between);
        let Value::Array(endpoints) = &condition.value else {
            panic!()
        };
        assert_eq!(endpoints.len(), 2);
        for endpoint in endpoints {
            let Value::String(text) = endpoint else { panic!() };
            chrono::DateTime::parse_from_rfc3339(text).expect("canonical ISO endpoint");
        }
    }

    #[test]
    fn year_over_year_handles_leap_day() {
        let filter = CrossFilter::for_table(test_schema(), "orders")
            .add_year_over_year("placed_at", ["2024-02-29", "2024-02-29"])
            .unwrap();

        let FilterNode::Group { children, .. } = filter.root() else {
            panic!()
        };
        let FilterNode::Condition(condition) = &children[0] else {
            panic!()
        };
        assert_eq!(
            condition.value,
            Value::Array(vec![
                Value::String("2023-03-01T00:00:00.000Z".to_string()),
                Value::String("2023-03-01T00:00:00.000Z".to_string()),
            ])
        );
    }
}
