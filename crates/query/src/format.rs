//! Deterministic rendering of a QueryConfig to SQL text with positional
//! placeholders. Rendering is pure: repeated calls yield identical text
//! and parameters.

use filters::{FilterCondition, Operator};
use schema::Value;

use crate::config::{QueryConfig, WhereItem};
use crate::QueryError;

/// Render `config` to SQL text plus its positional parameters, in
/// placeholder order.
pub fn render(config: &QueryConfig) -> Result<(String, Vec<Value>), QueryError> {
    if let Some(raw) = &config.raw_sql {
        return Ok((raw.clone(), Vec::new()));
    }

    let mut sql = String::new();
    let mut params = Vec::new();

    if !config.ctes.is_empty() {
        let rendered: Vec<String> = config
            .ctes
            .iter()
            .map(|cte| {
                params.extend(cte.params.iter().cloned());
                format!("{} AS ({})", cte.alias, cte.sql)
            })
            .collect();
        sql.push_str(&format!("WITH {} ", rendered.join(", ")));
    }

    sql.push_str("SELECT ");
    if config.distinct {
        sql.push_str("DISTINCT ");
    }
    let mut items: Vec<String> = config.select.iter().map(|item| item.render()).collect();
    items.extend(
        config
            .aggregates
            .iter()
            .map(|aggregate| format!("{} AS {}", aggregate.sql, aggregate.alias)),
    );
    if items.is_empty() {
        sql.push('*');
    } else {
        sql.push_str(&items.join(", "));
    }

    sql.push_str(&format!(" FROM {}", config.table));

    for join in &config.joins {
        sql.push_str(&format!(" {} JOIN {}", join.kind.as_sql(), join.table));
        if let Some(alias) = &join.alias {
            sql.push_str(&format!(" AS {alias}"));
        }
        sql.push_str(&format!(" ON {} = {}", join.left, join.right));
    }

    if !config.where_stream.is_empty() {
        sql.push_str(" WHERE ");
        render_where(&config.where_stream, &mut sql, &mut params)?;
    }

    let group_by = config.effective_group_by();
    if !group_by.is_empty() {
        sql.push_str(&format!(" GROUP BY {}", group_by.join(", ")));
    }

    if !config.having.is_empty() {
        let rendered: Vec<String> = config
            .having
            .iter()
            .map(|(predicate, bound)| {
                params.extend(bound.iter().cloned());
                predicate.clone()
            })
            .collect();
        sql.push_str(&format!(" HAVING {}", rendered.join(" AND ")));
    }

    if !config.order_by.is_empty() {
        let rendered: Vec<String> = config
            .order_by
            .iter()
            .map(|term| format!("{} {}", term.column, term.direction.as_sql()))
            .collect();
        sql.push_str(&format!(" ORDER BY {}", rendered.join(", ")));
    }

    if let Some(limit) = config.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = config.offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }

    if !config.settings.is_empty() {
        let rendered: Vec<String> = config
            .settings
            .iter()
            .map(|(name, value)| format!("{name} = {value}"))
            .collect();
        sql.push_str(&format!(" SETTINGS {}", rendered.join(", ")));
    }

    Ok((collapse_whitespace(&sql), params))
}

/// Walk the flattened WHERE stream. A conjunction precedes an item only
/// when it neither opens the stream nor directly follows a group start.
fn render_where(
    stream: &[WhereItem],
    sql: &mut String,
    params: &mut Vec<Value>,
) -> Result<(), QueryError> {
    let mut after_group_start = true;

    for item in stream {
        match item {
            WhereItem::GroupStart { conjunction } => {
                if !after_group_start {
                    sql.push_str(&format!(" {} ", conjunction.as_sql()));
                }
                sql.push('(');
                after_group_start = true;
            }
            WhereItem::GroupEnd => {
                sql.push(')');
                after_group_start = false;
            }
            WhereItem::Condition(condition) => {
                if !after_group_start {
                    sql.push_str(&format!(" {} ", condition.conjunction.as_sql()));
                }
                render_condition(condition, sql, params)?;
                after_group_start = false;
            }
            WhereItem::Raw {
                sql: fragment,
                params: bound,
                conjunction,
            } => {
                if !after_group_start {
                    sql.push_str(&format!(" {} ", conjunction.as_sql()));
                }
                sql.push_str(fragment);
                params.extend(bound.iter().cloned());
                after_group_start = false;
            }
        }
    }
    Ok(())
}

fn render_condition(
    condition: &FilterCondition,
    sql: &mut String,
    params: &mut Vec<Value>,
) -> Result<(), QueryError> {
    let column = &condition.column;

    match condition.operator {
        Operator::Eq => render_comparison(column, "=", condition, sql, params),
        Operator::Neq => render_comparison(column, "!=", condition, sql, params),
        Operator::Gt => render_comparison(column, ">", condition, sql, params),
        Operator::Gte => render_comparison(column, ">=", condition, sql, params),
        Operator::Lt => render_comparison(column, "<", condition, sql, params),
        Operator::Lte => render_comparison(column, "<=", condition, sql, params),
        Operator::Like => render_comparison(column, "LIKE", condition, sql, params),
        Operator::NotLike => render_comparison(column, "NOT LIKE", condition, sql, params),

        Operator::Between => match &condition.value {
            Value::Array(endpoints) | Value::Tuple(endpoints) if endpoints.len() == 2 => {
                sql.push_str(&format!("{column} BETWEEN ? AND ?"));
                params.extend(endpoints.iter().cloned());
                Ok(())
            }
            other => Err(QueryError::Render(format!(
                "between on '{column}' requires two endpoints, got {other:?}"
            ))),
        },

        Operator::In => render_membership(column, "IN", condition, sql, params),
        Operator::NotIn => render_membership(column, "NOT IN", condition, sql, params),
        Operator::GlobalIn => render_membership(column, "GLOBAL IN", condition, sql, params),
        Operator::GlobalNotIn => {
            render_membership(column, "GLOBAL NOT IN", condition, sql, params)
        }

        Operator::InSubquery => render_subquery(column, "IN", condition, sql),
        Operator::GlobalInSubquery => render_subquery(column, "GLOBAL IN", condition, sql),

        Operator::InTable => render_table_ref(column, "IN", condition, sql),
        Operator::GlobalInTable => render_table_ref(column, "GLOBAL IN", condition, sql),

        Operator::InTuple => render_tuples(column, "IN", condition, sql, params),
        Operator::GlobalInTuple => render_tuples(column, "GLOBAL IN", condition, sql, params),
    }
}

fn render_comparison(
    column: &str,
    op: &str,
    condition: &FilterCondition,
    sql: &mut String,
    params: &mut Vec<Value>,
) -> Result<(), QueryError> {
    sql.push_str(&format!("{column} {op} ?"));
    params.push(condition.value.clone());
    Ok(())
}

fn render_membership(
    column: &str,
    op: &str,
    condition: &FilterCondition,
    sql: &mut String,
    params: &mut Vec<Value>,
) -> Result<(), QueryError> {
    let Value::Array(values) = &condition.value else {
        return Err(QueryError::Render(format!(
            "{op} on '{column}' requires a sequence value"
        )));
    };
    if values.is_empty() {
        sql.push_str("1 = 0");
        return Ok(());
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    sql.push_str(&format!("{column} {op} ({placeholders})"));
    params.extend(values.iter().cloned());
    Ok(())
}

fn render_subquery(
    column: &str,
    op: &str,
    condition: &FilterCondition,
    sql: &mut String,
) -> Result<(), QueryError> {
    let Value::String(subquery) = &condition.value else {
        return Err(QueryError::Render(format!(
            "{op} subquery on '{column}' requires SQL text"
        )));
    };
    sql.push_str(&format!("{column} {op} ({subquery})"));
    Ok(())
}

fn render_table_ref(
    column: &str,
    op: &str,
    condition: &FilterCondition,
    sql: &mut String,
) -> Result<(), QueryError> {
    let Value::String(table) = &condition.value else {
        return Err(QueryError::Render(format!(
            "{op} table on '{column}' requires a table name"
        )));
    };
    sql.push_str(&format!("{column} {op} {table}"));
    Ok(())
}

fn render_tuples(
    column: &str,
    op: &str,
    condition: &FilterCondition,
    sql: &mut String,
    params: &mut Vec<Value>,
) -> Result<(), QueryError> {
    let Value::Array(tuples) = &condition.value else {
        return Err(QueryError::Render(format!(
            "{op} tuples on '{column}' requires a sequence of tuples"
        )));
    };
    if tuples.is_empty() {
        sql.push_str("1 = 0");
        return Ok(());
    }

    let mut rendered = Vec::with_capacity(tuples.len());
    for tuple in tuples {
        let (Value::Tuple(items) | Value::Array(items)) = tuple else {
            return Err(QueryError::Render(format!(
                "{op} tuples on '{column}' requires tuple elements"
            )));
        };
        rendered.push(format!("({})", vec!["?"; items.len()].join(", ")));
        params.extend(items.iter().cloned());
    }
    sql.push_str(&format!("{column} {op} ({})", rendered.join(", ")));
    Ok(())
}

/// Collapse runs of whitespace and surplus space around parentheses,
/// leaving string literals untouched.
fn collapse_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_string = false;
    let mut pending_space = false;

    for ch in sql.chars() {
        if in_string {
            out.push(ch);
            if ch == '\'' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '\'' => {
                if pending_space {
                    out.push(' ');
                    pending_space = false;
                }
                out.push(ch);
                in_string = true;
            }
            ch if ch.is_whitespace() => pending_space = !out.is_empty(),
            ')' => {
                pending_space = false;
                out.push(')');
            }
            ch => {
                if pending_space && !out.ends_with('(') {
                    out.push(' ');
                }
                pending_space = false;
                out.push(ch);
            }
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::collapse_whitespace;

    #[test]
    fn whitespace_collapses_outside_strings() {
        assert_eq!(
            collapse_whitespace("SELECT  a ,  b FROM ( t )  WHERE x = 'a  ( b )'"),
            "SELECT a , b FROM (t) WHERE x = 'a  ( b )'"
        );
    }
}
