use std::sync::Arc;

use engine::{Adapter, AdapterError, Row};
use filters::{Conjunction, CrossFilter, FilterNode, Operator};
use query::Database;
use schema::{ColumnType as CT, Direction, Relation, Schema, Value};

/// Rendering tests never reach the adapter.
struct NullAdapter;

#[async_trait::async_trait]
impl Adapter for NullAdapter {
    fn name(&self) -> &str {
        "null"
    }
    async fn query(&self, _sql: &str, _parameters: &[Value]) -> Result<Vec<Row>, AdapterError> {
        unreachable!("rendering tests don't execute")
    }
}

fn test_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder()
            .table(
                "test_table",
                [
                    ("id", CT::UInt64),
                    ("name", CT::String),
                    ("price", CT::Float64),
                    ("category", CT::String),
                    ("region", CT::String),
                    ("status", CT::String),
                    ("created_at", CT::DateTime { timezone: None }),
                ],
            )
            .table(
                "users",
                [
                    ("id", CT::UInt64),
                    ("name", CT::String),
                    ("organization_id", CT::String),
                ],
            )
            .relation(
                "user",
                Relation::single("users", "test_table.id", "users.id"),
            )
            .build()
            .unwrap(),
    )
}

fn db() -> Database {
    Database::new(test_schema(), Arc::new(NullAdapter))
}

#[test]
fn where_and_order_by() {
    let builder = db()
        .table("test_table")
        .select(["id", "name"])
        .and_where("id", Operator::Gt, 1i64)
        .unwrap()
        .limit(10);

    let (sql, params) = builder.to_sql_with_params().unwrap();
    assert_eq!(sql, "SELECT id, name FROM test_table WHERE id > ? LIMIT 10");
    assert_eq!(params, vec![Value::Int(1)]);
}

#[test]
fn cross_filter_with_nested_groups() {
    let filter = CrossFilter::for_table(test_schema(), "test_table")
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
        .unwrap()
        .add_group(
            Conjunction::Or,
            vec![
                FilterNode::condition("status", Operator::Eq, "active"),
                FilterNode::condition("status", Operator::Eq, "pending"),
            ],
        )
        .unwrap();

    let sql = db()
        .table("test_table")
        .apply_cross_filters(&filter)
        .unwrap()
        .to_sql()
        .unwrap();

    assert_eq!(
        sql,
        "SELECT * FROM test_table WHERE (region = 'North' OR \
         (price >= 100 AND price <= 200) OR \
         (status = 'active' OR status = 'pending'))"
    );
}

#[test]
fn top_level_and_group_distributes_without_extra_parentheses() {
    let filter = CrossFilter::for_table(test_schema(), "test_table")
        .add("region", Operator::Eq, "North")
        .unwrap()
        .add_group(
            Conjunction::Or,
            vec![
                FilterNode::condition("status", Operator::Eq, "active"),
                FilterNode::condition("status", Operator::Eq, "pending"),
            ],
        )
        .unwrap();

    let (sql, params) = db()
        .table("test_table")
        .apply_cross_filters(&filter)
        .unwrap()
        .to_sql_with_params()
        .unwrap();

    assert_eq!(
        sql,
        "SELECT * FROM test_table WHERE region = ? AND (status = ? OR status = ?)"
    );
    assert_eq!(params.len(), 3);
}

#[test]
fn aggregation_auto_groups_by_selected_columns() {
    let sql = db()
        .table("test_table")
        .select(["category"])
        .sum("price", Some("revenue"))
        .count("id", Some("order_count"))
        .avg("price", Some("average_price"))
        .to_sql()
        .unwrap();

    assert_eq!(
        sql,
        "SELECT category, SUM(price) AS revenue, COUNT(id) AS order_count, \
         AVG(price) AS average_price FROM test_table GROUP BY category"
    );
}

#[test]
fn explicit_group_by_wins_over_auto_grouping() {
    let sql = db()
        .table("test_table")
        .select(["category", "region"])
        .sum("price", None)
        .group_by(["category"])
        .to_sql()
        .unwrap();

    assert_eq!(
        sql,
        "SELECT category, region, SUM(price) AS sum_price FROM test_table GROUP BY category"
    );
}

#[test]
fn empty_set_membership_renders_always_false() {
    let (sql, params) = db()
        .table("test_table")
        .and_where("id", Operator::In, Value::Array(Vec::new()))
        .unwrap()
        .to_sql_with_params()
        .unwrap();

    assert_eq!(sql, "SELECT * FROM test_table WHERE 1 = 0");
    assert!(params.is_empty());
}

#[test]
fn between_with_null_endpoint_fails_synchronously() {
    let err = db()
        .table("test_table")
        .where_between("id", Value::Null, 5i64)
        .unwrap_err();
    assert!(err.to_string().contains("two non-null endpoints"));
}

#[test]
fn invalid_value_types_fail_before_sql_exists() {
    let err = db()
        .table("test_table")
        .and_where("id", Operator::Eq, "not a number")
        .unwrap_err();
    assert!(matches!(err, query::QueryError::Filter(_)));
}

#[test]
fn where_groups_nest_with_explicit_parentheses() {
    let (sql, params) = db()
        .table("test_table")
        .and_where("region", Operator::Eq, "North")
        .unwrap()
        .or_where_group(|group| {
            group
                .and_where("price", Operator::Gte, 10i64)?
                .and_where("price", Operator::Lte, 20i64)?
                .or_where_group(|inner| {
                    inner
                        .and_where("status", Operator::Eq, "active")?
                        .or_where("status", Operator::Eq, "pending")
                })
        })
        .unwrap()
        .to_sql_with_params()
        .unwrap();

    assert_eq!(
        sql,
        "SELECT * FROM test_table WHERE region = ? OR \
         (price >= ? AND price <= ? OR (status = ? OR status = ?))"
    );
    assert_eq!(params.len(), 5);
}

#[test]
fn placeholder_count_matches_parameters() {
    let (sql, params) = db()
        .table("test_table")
        .and_where("region", Operator::In, vec!["North", "South"])
        .unwrap()
        .where_between("price", 5i64, 10i64)
        .unwrap()
        .and_where("name", Operator::Like, "%co%")
        .unwrap()
        .having("SUM(price) > ?", vec![Value::Int(100)])
        .to_sql_with_params()
        .unwrap();

    let placeholders = sql.matches('?').count();
    assert_eq!(placeholders, params.len());
    assert_eq!(placeholders, 6);
}

#[test]
fn engine_membership_operators_render_the_dialect() {
    let (sql, _) = db()
        .table("test_table")
        .and_where("id", Operator::GlobalIn, vec![1i64, 2])
        .unwrap()
        .and_where("id", Operator::InSubquery, "SELECT id FROM users")
        .unwrap()
        .and_where("id", Operator::GlobalInTable, "users")
        .unwrap()
        .and_where(
            "(id, name)",
            Operator::InTuple,
            Value::Array(vec![
                Value::Tuple(vec![Value::Int(1), Value::from("a")]),
                Value::Tuple(vec![Value::Int(2), Value::from("b")]),
            ]),
        )
        .unwrap()
        .to_sql_with_params()
        .unwrap();

    assert_eq!(
        sql,
        "SELECT * FROM test_table WHERE id GLOBAL IN (?, ?) AND \
         id IN (SELECT id FROM users) AND id GLOBAL IN users AND \
         (id, name) IN ((?, ?), (?, ?))"
    );
}

#[test]
fn joins_render_in_registration_order() {
    let sql = db()
        .table("test_table")
        .select(["test_table.id", "users.name"])
        .left_join("users", "test_table.id", "users.id", Some("u"))
        .to_sql()
        .unwrap();

    assert_eq!(
        sql,
        "SELECT test_table.id, users.name FROM test_table \
         LEFT JOIN users AS u ON test_table.id = users.id"
    );
}

#[test]
fn named_relations_resolve_to_joins() {
    let sql = db()
        .table("test_table")
        .with_relation("user", None)
        .unwrap()
        .to_sql()
        .unwrap();

    assert_eq!(
        sql,
        "SELECT * FROM test_table INNER JOIN users ON test_table.id = users.id"
    );
}

#[test]
fn ctes_settings_and_buckets_render() {
    let revenue = db()
        .table("test_table")
        .select(["category"])
        .sum("price", Some("revenue"));

    let builder = db()
        .table("test_table")
        .with_cte_builder("revenue_by_category", &revenue)
        .unwrap()
        .group_by_time_interval("created_at", "day", None)
        .order_by("created_at", Direction::Desc)
        .settings([("max_threads", "4")]);

    insta::assert_snapshot!(builder.to_sql().unwrap(), @"WITH revenue_by_category AS (SELECT category, SUM(price) AS revenue FROM test_table GROUP BY category) SELECT toStartOfDay(created_at) AS created_at FROM test_table GROUP BY created_at ORDER BY created_at DESC SETTINGS max_threads = 4");
}

#[test]
fn rendering_is_pure_and_clone_stable() {
    let builder = db()
        .table("test_table")
        .select(["id"])
        .and_where("region", Operator::Eq, "North")
        .unwrap()
        .order_by("id", Direction::Asc)
        .limit(5);

    let first = builder.to_sql_with_params().unwrap();
    let second = builder.to_sql_with_params().unwrap();
    let cloned = builder.clone().to_sql_with_params().unwrap();

    assert_eq!(first, second);
    assert_eq!(first, cloned);
}

#[test]
fn distinct_and_pagination_modifiers() {
    let sql = db()
        .table("test_table")
        .distinct()
        .select(["region"])
        .order_by("region", Direction::Asc)
        .limit(10)
        .offset(20)
        .to_sql()
        .unwrap();

    assert_eq!(
        sql,
        "SELECT DISTINCT region FROM test_table ORDER BY region ASC LIMIT 10 OFFSET 20"
    );
}

#[test]
fn raw_sql_overrides_rendering() {
    let sql = db()
        .table("test_table")
        .raw("SELECT 1 AS one")
        .to_sql()
        .unwrap();
    assert_eq!(sql, "SELECT 1 AS one");
}
