use schema::Value;

/// Operator enumerates the predicate operators of the filter model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Between,
    Like,
    NotLike,
    In,
    NotIn,
    GlobalIn,
    GlobalNotIn,
    InSubquery,
    GlobalInSubquery,
    InTable,
    GlobalInTable,
    InTuple,
    GlobalInTuple,
}

impl Operator {
    /// Operators whose value must be a sequence of elements.
    pub fn expects_sequence(&self) -> bool {
        matches!(
            self,
            Operator::In
                | Operator::NotIn
                | Operator::GlobalIn
                | Operator::GlobalNotIn
                | Operator::InTuple
                | Operator::GlobalInTuple
        )
    }

    /// Ordering comparisons, rejected for non-orderable column types.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte
        )
    }

    /// Tuple membership bypasses per-column value validation; arity is
    /// checked structurally instead.
    pub fn is_tuple_membership(&self) -> bool {
        matches!(self, Operator::InTuple | Operator::GlobalInTuple)
    }

    /// Membership against an inlined subquery or table reference; the
    /// value is SQL text rather than a parameter.
    pub fn takes_sql_reference(&self) -> bool {
        matches!(
            self,
            Operator::InSubquery
                | Operator::GlobalInSubquery
                | Operator::InTable
                | Operator::GlobalInTable
        )
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = serde_json::to_value(self).expect("operator serializes");
        write!(f, "{}", text.as_str().unwrap_or("?"))
    }
}

/// Conjunction joins a condition or group to the predicate before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Conjunction {
    And,
    Or,
}

impl Default for Conjunction {
    fn default() -> Conjunction {
        Conjunction::And
    }
}

impl Conjunction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

/// FilterCondition is a leaf predicate of the filter tree.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FilterCondition {
    pub column: String,
    pub operator: Operator,
    pub value: Value,
    #[serde(default = "FilterCondition::default_conjunction")]
    pub conjunction: Conjunction,
}

impl FilterCondition {
    pub fn new(column: &str, operator: Operator, value: impl Into<Value>) -> FilterCondition {
        FilterCondition {
            column: column.to_string(),
            operator,
            value: value.into(),
            conjunction: Conjunction::And,
        }
    }

    pub fn or(mut self) -> FilterCondition {
        self.conjunction = Conjunction::Or;
        self
    }

    fn default_conjunction() -> Conjunction {
        Conjunction::And
    }
}

/// FilterNode is the tagged tree of conditions and AND/OR groups.
/// Groups nest arbitrarily; cycles are impossible by construction.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FilterNode {
    Condition(FilterCondition),
    Group {
        operator: Conjunction,
        children: Vec<FilterNode>,
    },
}

impl FilterNode {
    pub fn group(operator: Conjunction, children: Vec<FilterNode>) -> FilterNode {
        FilterNode::Group { operator, children }
    }

    pub fn condition(column: &str, operator: Operator, value: impl Into<Value>) -> FilterNode {
        FilterNode::Condition(FilterCondition::new(column, operator, value))
    }
}

impl From<FilterCondition> for FilterNode {
    fn from(condition: FilterCondition) -> FilterNode {
        FilterNode::Condition(condition)
    }
}
