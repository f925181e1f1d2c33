//! Opaque SQL expression values that flow into SELECT, WHERE, and GROUP BY
//! positions, with helper constructors for the common engine functions.

/// An opaque SQL fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub sql: String,
}

/// An expression rendered as `sql AS alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasedExpr {
    pub sql: String,
    pub alias: String,
}

impl Expr {
    pub fn with_alias(self, alias: &str) -> AliasedExpr {
        AliasedExpr {
            sql: self.sql,
            alias: alias.to_string(),
        }
    }
}

/// Raw SQL text.
pub fn raw(sql: &str) -> Expr {
    Expr {
        sql: sql.to_string(),
    }
}

/// Raw SQL text with an alias.
pub fn raw_as(sql: &str, alias: &str) -> AliasedExpr {
    AliasedExpr {
        sql: sql.to_string(),
        alias: alias.to_string(),
    }
}

/// Function application over column references or other fragments.
pub fn func(name: &str, args: &[&str]) -> Expr {
    Expr {
        sql: format!("{name}({})", args.join(", ")),
    }
}

/// Cast to a date.
pub fn to_date(expr: &str) -> Expr {
    func("toDate", &[expr])
}

/// Format a date-like column, optionally in a timezone.
pub fn format_date(column: &str, format: &str, timezone: Option<&str>) -> Expr {
    let sql = match timezone {
        Some(tz) => format!("formatDateTime({column}, '{format}', '{tz}')"),
        None => format!("formatDateTime({column}, '{format}')"),
    };
    Expr { sql }
}

/// Bucket a date-like column by a named grain (`day`, `week`, ...), using
/// the engine's `toStartOf*` family where one exists.
pub fn to_start_of(grain: &str, column: &str) -> Expr {
    let name = match grain {
        "minute" => "toStartOfMinute",
        "hour" => "toStartOfHour",
        "day" => "toStartOfDay",
        "week" => "toStartOfWeek",
        "month" => "toStartOfMonth",
        "quarter" => "toStartOfQuarter",
        "year" => "toStartOfYear",
        other => {
            return Expr {
                sql: format!("toStartOfInterval({column}, INTERVAL {other})"),
            }
        }
    };
    func(name, &[column])
}

/// Extract a date part as a number.
pub fn date_part(part: &str, column: &str) -> Expr {
    let name = match part {
        "year" => "toYear",
        "quarter" => "toQuarter",
        "month" => "toMonth",
        "week" => "toWeek",
        "day" => "toDayOfMonth",
        "day_of_week" => "toDayOfWeek",
        "hour" => "toHour",
        "minute" => "toMinute",
        "second" => "toSecond",
        other => {
            return Expr {
                sql: format!("extract({other} FROM {column})"),
            }
        }
    };
    func(name, &[column])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn helpers_render_engine_functions() {
        assert_eq!(func("sum", &["price"]).sql, "sum(price)");
        assert_eq!(to_date("created_at").sql, "toDate(created_at)");
        assert_eq!(
            format_date("created_at", "%Y-%m", Some("UTC")).sql,
            "formatDateTime(created_at, '%Y-%m', 'UTC')"
        );
        assert_eq!(to_start_of("day", "ts").sql, "toStartOfDay(ts)");
        assert_eq!(
            to_start_of("15 minute", "ts").sql,
            "toStartOfInterval(ts, INTERVAL 15 minute)"
        );
        assert_eq!(date_part("year", "ts").sql, "toYear(ts)");
        assert_eq!(date_part("epoch", "ts").sql, "extract(epoch FROM ts)");
    }
}
