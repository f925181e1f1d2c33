mod crossfilter;
mod execute;
mod filtering;
pub(crate) mod paginate;

pub use execute::ExecuteOptions;
pub use filtering::GroupBuilder;

use std::sync::Arc;

use cache::CachePolicy;
use filters::{FilterCondition, Operator};
use schema::{Direction, JoinKind, Value};

use crate::config::{CteDef, Join, OrderTerm, QueryConfig, SelectItem, WhereItem};
use crate::expr::{AliasedExpr, Expr};
use crate::{QueryError, Shared};

/// Per-call overrides when resolving a named relation.
#[derive(Debug, Clone, Default)]
pub struct RelationOptions {
    pub kind: Option<JoinKind>,
    pub alias: Option<String>,
}

/// QueryBuilder composes a QueryConfig incrementally. Operations take
/// effect in declaration order; `clone()` returns an independent copy of
/// the configuration sharing the same runtime handles.
#[derive(Clone)]
pub struct QueryBuilder {
    pub(crate) shared: Arc<Shared>,
    pub(crate) config: QueryConfig,
    pub(crate) cache_policy: Option<CachePolicy>,
}

impl std::fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("config", &self.config)
            .field("cache_policy", &self.cache_policy)
            .finish()
    }
}

impl QueryBuilder {
    pub(crate) fn new(shared: Arc<Shared>, table: &str) -> QueryBuilder {
        let mut config = QueryConfig::for_table(table);

        // A tenant-scoped handle injects its filter ahead of any caller
        // conditions.
        if let Some(tenant) = &shared.tenant {
            config.where_stream.push(WhereItem::Condition(FilterCondition::new(
                &tenant.column,
                Operator::Eq,
                tenant.value.clone(),
            )));
        }

        QueryBuilder {
            shared,
            config,
            cache_policy: None,
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    // --- selection ---

    /// Replace the select list with plain column references.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.select = columns
            .into_iter()
            .map(|column| SelectItem::Column(column.into()))
            .collect();
        self
    }

    /// An empty select list renders `*`.
    pub fn select_all(mut self) -> Self {
        self.config.select.clear();
        self
    }

    pub fn select_expr(mut self, expr: Expr) -> Self {
        self.config.select.push(SelectItem::Expr(expr));
        self
    }

    pub fn select_aliased(mut self, expr: AliasedExpr) -> Self {
        self.config.select.push(SelectItem::Aliased(expr));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.config.distinct = true;
        self
    }

    // --- aggregation ---

    pub fn sum(self, column: &str, alias: Option<&str>) -> Self {
        self.aggregate("SUM", column, alias)
    }
    pub fn count(self, column: &str, alias: Option<&str>) -> Self {
        self.aggregate("COUNT", column, alias)
    }
    pub fn avg(self, column: &str, alias: Option<&str>) -> Self {
        self.aggregate("AVG", column, alias)
    }
    pub fn min(self, column: &str, alias: Option<&str>) -> Self {
        self.aggregate("MIN", column, alias)
    }
    pub fn max(self, column: &str, alias: Option<&str>) -> Self {
        self.aggregate("MAX", column, alias)
    }

    fn aggregate(mut self, function: &str, column: &str, alias: Option<&str>) -> Self {
        let alias = alias
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{column}", function.to_lowercase()));
        self.config.aggregates.push(AliasedExpr {
            sql: format!("{function}({column})"),
            alias,
        });
        self
    }

    // --- joins ---

    pub fn inner_join(self, table: &str, left: &str, right: &str, alias: Option<&str>) -> Self {
        self.join(JoinKind::Inner, table, left, right, alias)
    }
    pub fn left_join(self, table: &str, left: &str, right: &str, alias: Option<&str>) -> Self {
        self.join(JoinKind::Left, table, left, right, alias)
    }
    pub fn right_join(self, table: &str, left: &str, right: &str, alias: Option<&str>) -> Self {
        self.join(JoinKind::Right, table, left, right, alias)
    }
    pub fn full_join(self, table: &str, left: &str, right: &str, alias: Option<&str>) -> Self {
        self.join(JoinKind::Full, table, left, right, alias)
    }

    fn join(
        mut self,
        kind: JoinKind,
        table: &str,
        left: &str,
        right: &str,
        alias: Option<&str>,
    ) -> Self {
        self.config.joins.push(Join {
            kind,
            table: table.to_string(),
            alias: alias.map(str::to_string),
            left: left.to_string(),
            right: right.to_string(),
        });
        self
    }

    /// Resolve a named relation from the schema registry into one or more
    /// joins. Overrides apply to the terminal step of a chained path.
    pub fn with_relation(
        mut self,
        name: &str,
        options: Option<RelationOptions>,
    ) -> Result<Self, QueryError> {
        let relation = self.shared.schema.relation(name)?.clone();
        if relation.steps.is_empty() {
            return Ok(self);
        }
        let options = options.unwrap_or_default();
        let last = relation.steps.len() - 1;

        for (at, step) in relation.steps.into_iter().enumerate() {
            let (kind, alias) = if at == last {
                (
                    options.kind.unwrap_or(step.kind),
                    options.alias.clone().or(step.alias),
                )
            } else {
                (step.kind, step.alias)
            };
            self = self.join(kind, &step.table, &step.left, &step.right, alias.as_deref());
        }
        Ok(self)
    }

    // --- grouping, ordering, modifiers ---

    /// Replace the GROUP BY list.
    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.group_by = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Bucket a date-like column: selects the bucket expression under the
    /// column's own name and groups by it. With `function`, that named
    /// function is applied instead of the grain's `toStartOf*` form.
    pub fn group_by_time_interval(
        mut self,
        column: &str,
        interval: &str,
        function: Option<&str>,
    ) -> Self {
        let expr = match function {
            Some(name) => crate::expr::func(name, &[column]),
            None => crate::expr::to_start_of(interval, column),
        };
        self.config
            .select
            .push(SelectItem::Aliased(expr.with_alias(column)));
        self.config.group_by.push(column.to_string());
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.config.order_by.push(OrderTerm {
            column: column.to_string(),
            direction,
        });
        self
    }

    /// A HAVING predicate in raw form; predicates join with AND.
    pub fn having(mut self, predicate: &str, params: Vec<Value>) -> Self {
        self.config.having.push((predicate.to_string(), params));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.config.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.config.offset = Some(offset);
        self
    }

    // --- CTEs, raw SQL, settings ---

    pub fn with_cte(mut self, alias: &str, subquery: &str) -> Self {
        self.config.ctes.push(CteDef {
            alias: alias.to_string(),
            sql: subquery.to_string(),
            params: Vec::new(),
        });
        self
    }

    /// A CTE backed by another builder; its parameters precede all others
    /// in positional order.
    pub fn with_cte_builder(mut self, alias: &str, builder: &QueryBuilder) -> Result<Self, QueryError> {
        let (sql, params) = builder.to_sql_with_params()?;
        self.config.ctes.push(CteDef {
            alias: alias.to_string(),
            sql,
            params,
        });
        Ok(self)
    }

    /// Replace the whole rendering with raw SQL text.
    pub fn raw(mut self, sql: &str) -> Self {
        self.config.raw_sql = Some(sql.to_string());
        self
    }

    /// Engine settings appended as a trailing SETTINGS clause.
    pub fn settings<I, K, V>(mut self, settings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.config
            .settings
            .extend(settings.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Cache policy for this builder's executions; overrides the database
    /// default and is overridden per-call by `ExecuteOptions`.
    pub fn cache(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = Some(policy);
        self
    }

    /// Tables visible to column validation: the base table plus joins.
    pub(crate) fn visible_tables(&self) -> Vec<String> {
        let mut tables = vec![self.config.table.clone()];
        tables.extend(self.config.joins.iter().map(|join| join.table.clone()));
        tables
    }

    pub(crate) fn push_where(&mut self, item: WhereItem) {
        self.config.where_stream.push(item);
    }

    pub(crate) fn push_condition(
        &mut self,
        mut condition: FilterCondition,
    ) -> Result<(), QueryError> {
        filtering::validate_against(&self.shared, &self.visible_tables(), &mut condition)?;
        self.config.where_stream.push(WhereItem::Condition(condition));
        Ok(())
    }

    pub(crate) fn top_n(mut self, column: &str, n: u64, direction: Direction) -> Self {
        self = self.order_by(column, direction);
        self.limit(n)
    }
}
