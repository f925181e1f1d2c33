//! Cursor-stable pagination over an ORDER BY: opaque cursors encoding the
//! last row's order tuple, lexicographic continuation predicates, and an
//! async page iterator.

use engine::Row;
use futures::Stream;
use schema::{Direction, Value};

use crate::config::{OrderTerm, WhereItem};
use crate::predicate::{col, val, Predicate};
use crate::QueryError;

use super::QueryBuilder;

/// One term of a decoded cursor: the ORDER BY tuple entry it was taken
/// from, plus the last row's value for it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Cursor {
    pub column: String,
    pub direction: Direction,
    pub value: serde_json::Value,
}

/// Page navigation metadata.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub start_cursor: String,
    pub end_cursor: String,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub total_count: u64,
    pub total_pages: u64,
    pub page_size: u64,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub data: Vec<Row>,
    pub page_info: PageInfo,
}

/// Options for one `paginate` call.
#[derive(Debug, Clone, Default)]
pub struct PaginateOptions {
    pub page_size: u64,
    pub after: Option<String>,
    pub before: Option<String>,
    /// Overrides the builder's ORDER BY when non-empty.
    pub order_by: Vec<(String, Direction)>,
}

/// Encode a row's order tuple as an opaque cursor.
pub(crate) fn encode_cursor(row: &Row, order: &[OrderTerm]) -> String {
    let entries: Vec<Cursor> = order
        .iter()
        .map(|term| Cursor {
            column: term.column.clone(),
            direction: term.direction,
            value: row.get(bare_column(&term.column)).cloned().unwrap_or(serde_json::Value::Null),
        })
        .collect();
    let text = serde_json::to_string(&entries).expect("cursor entries serialize");
    base64::encode_config(text, base64::URL_SAFE_NO_PAD)
}

/// Decode a cursor. Total and side-effect-free: any malformed input is an
/// `InvalidCursor` error, never a panic.
pub(crate) fn decode_cursor(cursor: &str) -> Result<Vec<Cursor>, QueryError> {
    let bytes = base64::decode_config(cursor, base64::URL_SAFE_NO_PAD)
        .map_err(|err| QueryError::Cursor(format!("{err}")))?;
    serde_json::from_slice(&bytes).map_err(|err| QueryError::Cursor(format!("{err}")))
}

/// Qualified references and aliases address row fields by their bare name.
fn bare_column(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

impl QueryBuilder {
    /// Fetch one page. `after` continues forward from a cursor; `before`
    /// reverses direction internally and un-reverses the returned rows.
    pub async fn paginate(&self, options: PaginateOptions) -> Result<Page, QueryError> {
        let order: Vec<OrderTerm> = if options.order_by.is_empty() {
            self.config.order_by.clone()
        } else {
            options
                .order_by
                .iter()
                .map(|(column, direction)| OrderTerm {
                    column: column.clone(),
                    direction: *direction,
                })
                .collect()
        };
        if order.is_empty() {
            return Err(QueryError::Cursor(
                "pagination requires an ORDER BY".to_string(),
            ));
        }

        let total_count = self.count_all().await?;
        let page_size = options.page_size;

        if page_size == 0 {
            return Ok(Page {
                data: Vec::new(),
                page_info: PageInfo {
                    start_cursor: String::new(),
                    end_cursor: String::new(),
                    has_next_page: false,
                    has_previous_page: false,
                    total_count,
                    total_pages: 0,
                    page_size,
                },
            });
        }

        let backward = options.before.is_some();
        let effective_order: Vec<OrderTerm> = if backward {
            order
                .iter()
                .map(|term| OrderTerm {
                    column: term.column.clone(),
                    direction: term.direction.reversed(),
                })
                .collect()
        } else {
            order.clone()
        };

        let mut query = self.clone();
        query.config.order_by = effective_order.clone();
        query.config.limit = Some(page_size + 1);
        query.config.offset = None;

        let cursor = options.after.as_deref().or(options.before.as_deref());
        if let Some(cursor) = cursor {
            let entries = decode_cursor(cursor)?;
            check_shape(&entries, &order)?;

            if let Some(continuation) = continuation_predicate(&entries, &effective_order) {
                let (sql, params) = continuation.into_parts();
                query.push_where(WhereItem::Raw {
                    sql,
                    params,
                    conjunction: filters::Conjunction::And,
                });
            }
        }

        let mut rows = query.execute().await?;
        let has_more = rows.len() as u64 > page_size;
        rows.truncate(page_size as usize);
        if backward {
            rows.reverse();
        }

        let (start_cursor, end_cursor, has_next_page, has_previous_page) = if rows.is_empty() {
            (String::new(), String::new(), false, false)
        } else {
            let start = encode_cursor(&rows[0], &order);
            let end = encode_cursor(rows.last().expect("rows are non-empty"), &order);
            if backward {
                // There is at least the row the cursor pointed at ahead.
                (start, end, true, has_more)
            } else {
                (start, end, has_more, options.after.is_some())
            }
        };

        Ok(Page {
            data: rows,
            page_info: PageInfo {
                start_cursor,
                end_cursor,
                has_next_page,
                has_previous_page,
                total_count,
                total_pages: total_count.div_ceil(page_size),
                page_size,
            },
        })
    }

    /// The first page of `page_size` rows.
    pub async fn first_page(&self, page_size: u64) -> Result<Page, QueryError> {
        self.paginate(PaginateOptions {
            page_size,
            ..PaginateOptions::default()
        })
        .await
    }

    /// Yield pages forward until `has_next_page` is false.
    pub fn iterate_pages(
        &self,
        page_size: u64,
    ) -> impl Stream<Item = Result<Page, QueryError>> + 'static {
        let builder = self.clone();

        futures::stream::try_unfold(Some(None::<String>), move |state| {
            let builder = builder.clone();
            async move {
                let Some(after) = state else { return Ok(None) };

                let page = builder
                    .paginate(PaginateOptions {
                        page_size,
                        after,
                        ..PaginateOptions::default()
                    })
                    .await?;

                let next = if page.page_info.has_next_page {
                    Some(Some(page.page_info.end_cursor.clone()))
                } else {
                    None
                };
                Ok(Some((page, next)))
            }
        })
    }

    /// Count all rows matching this builder's filters, ignoring ordering
    /// and paging. Grouped queries count their groups via a subquery.
    async fn count_all(&self) -> Result<u64, QueryError> {
        let mut counted = self.clone();
        counted.config.order_by.clear();
        counted.config.limit = None;
        counted.config.offset = None;

        let needs_subquery = !counted.config.aggregates.is_empty()
            || !counted.config.group_by.is_empty()
            || counted.config.distinct
            || counted.config.raw_sql.is_some();

        let (sql, params) = if needs_subquery {
            let (inner, params) = counted.to_sql_with_params()?;
            (format!("SELECT count() AS total FROM ({inner})"), params)
        } else {
            counted.config.select.clear();
            counted.config.aggregates.push(crate::expr::AliasedExpr {
                sql: "count()".to_string(),
                alias: "total".to_string(),
            });
            counted.to_sql_with_params()?
        };

        let rows = self.shared.adapter.query(&sql, &params).await?;
        let total = rows
            .first()
            .and_then(|row| row.get("total"))
            .map(|value| match value {
                serde_json::Value::Number(n) => n.as_u64().unwrap_or(0),
                serde_json::Value::String(s) => s.parse().unwrap_or(0),
                _ => 0,
            })
            .unwrap_or(0);
        Ok(total)
    }
}

/// Cursors are only comparable within the same ORDER BY shape.
fn check_shape(entries: &[Cursor], order: &[OrderTerm]) -> Result<(), QueryError> {
    let matches = entries.len() == order.len()
        && entries.iter().zip(order).all(|(entry, term)| {
            entry.column == term.column && entry.direction == term.direction
        });
    if matches {
        Ok(())
    } else {
        Err(QueryError::Cursor(
            "cursor does not match the query's ORDER BY shape".to_string(),
        ))
    }
}

/// The `(column, direction)`-lexicographic continuation after a cursor:
/// `(c1 > v1) OR (c1 = v1 AND c2 > v2) OR ...`, with the comparator of
/// each term following its effective direction.
fn continuation_predicate(entries: &[Cursor], effective: &[OrderTerm]) -> Option<Predicate> {
    let mut alternatives = Vec::with_capacity(entries.len());

    for (at, (entry, term)) in entries.iter().zip(effective).enumerate() {
        let value = Value::from_json(entry.value.clone());
        let mut predicate = match term.direction {
            Direction::Asc => col(&term.column).gt(val(value)),
            Direction::Desc => col(&term.column).lt(val(value)),
        };
        for previous in entries[..at].iter().rev() {
            let bound = Value::from_json(previous.value.clone());
            predicate = col(&previous.column).eq(val(bound)).and(predicate);
        }
        alternatives.push(predicate);
    }
    Predicate::any(alternatives)
}

#[cfg(test)]
mod test {
    use super::*;

    fn order(terms: &[(&str, Direction)]) -> Vec<OrderTerm> {
        terms
            .iter()
            .map(|(column, direction)| OrderTerm {
                column: column.to_string(),
                direction: *direction,
            })
            .collect()
    }

    #[test]
    fn cursor_round_trips_the_order_tuple() {
        let mut row = Row::new();
        row.insert("id".to_string(), serde_json::json!(42));
        row.insert("name".to_string(), serde_json::json!("x"));

        let order = order(&[("t.id", Direction::Asc), ("name", Direction::Desc)]);
        let cursor = encode_cursor(&row, &order);
        let decoded = decode_cursor(&cursor).unwrap();

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].column, "t.id");
        assert_eq!(decoded[0].value, serde_json::json!(42));
        assert_eq!(decoded[1].direction, Direction::Desc);
        assert_eq!(decoded[1].value, serde_json::json!("x"));
    }

    #[test]
    fn malformed_cursors_decode_to_errors() {
        assert!(matches!(
            decode_cursor("not a cursor!"),
            Err(QueryError::Cursor(_))
        ));
        assert!(matches!(
            decode_cursor(&base64::encode_config("[1, 2]", base64::URL_SAFE_NO_PAD)),
            Err(QueryError::Cursor(_))
        ));
    }

    #[test]
    fn continuation_is_lexicographic() {
        let entries = vec![
            Cursor {
                column: "a".to_string(),
                direction: Direction::Asc,
                value: serde_json::json!(1),
            },
            Cursor {
                column: "b".to_string(),
                direction: Direction::Desc,
                value: serde_json::json!("x"),
            },
        ];
        let effective = order(&[("a", Direction::Asc), ("b", Direction::Desc)]);

        let (sql, params) = continuation_predicate(&entries, &effective)
            .unwrap()
            .into_parts();
        assert_eq!(sql, "(a > ? OR (a = ? AND b < ?))");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn cursor_shape_mismatch_is_rejected() {
        let entries = vec![Cursor {
            column: "a".to_string(),
            direction: Direction::Asc,
            value: serde_json::json!(1),
        }];
        assert!(check_shape(&entries, &order(&[("a", Direction::Desc)])).is_err());
        assert!(check_shape(&entries, &order(&[("a", Direction::Asc)])).is_ok());
    }
}
