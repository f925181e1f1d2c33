//! Composable WHERE predicates: leaves are column references, parameter
//! values, or raw text; combinators emit parenthesized AND/OR chains.
//! Every predicate carries its SQL fragment and the ordered parameters it
//! contributed.

use schema::Value;

/// An operand of a comparison: a fragment plus any parameters it binds.
#[derive(Debug, Clone)]
pub struct Operand {
    sql: String,
    params: Vec<Value>,
}

/// A column reference.
pub fn col(name: &str) -> Operand {
    Operand {
        sql: name.to_string(),
        params: Vec::new(),
    }
}

/// A literal value, emitted as a positional parameter.
pub fn val(value: impl Into<Value>) -> Operand {
    Operand {
        sql: "?".to_string(),
        params: vec![value.into()],
    }
}

/// Raw SQL text binding no parameters.
pub fn lit(sql: &str) -> Operand {
    Operand {
        sql: sql.to_string(),
        params: Vec::new(),
    }
}

impl Operand {
    pub fn eq(self, other: Operand) -> Predicate {
        self.compare("=", other)
    }
    pub fn neq(self, other: Operand) -> Predicate {
        self.compare("!=", other)
    }
    pub fn gt(self, other: Operand) -> Predicate {
        self.compare(">", other)
    }
    pub fn gte(self, other: Operand) -> Predicate {
        self.compare(">=", other)
    }
    pub fn lt(self, other: Operand) -> Predicate {
        self.compare("<", other)
    }
    pub fn lte(self, other: Operand) -> Predicate {
        self.compare("<=", other)
    }

    /// Membership in a flattened parameter list. An empty list renders the
    /// always-false predicate.
    pub fn in_list<I, V>(self, values: I) -> Predicate
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Predicate {
                sql: "1 = 0".to_string(),
                params: Vec::new(),
            };
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        let mut params = self.params;
        params.extend(values);
        Predicate {
            sql: format!("{} IN ({placeholders})", self.sql),
            params,
        }
    }

    fn compare(self, op: &str, other: Operand) -> Predicate {
        let mut params = self.params;
        params.extend(other.params);
        Predicate {
            sql: format!("{} {op} {}", self.sql, other.sql),
            params,
        }
    }
}

/// A composed predicate fragment with its ordered parameters.
#[derive(Debug, Clone)]
pub struct Predicate {
    sql: String,
    params: Vec<Value>,
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        self.combine("AND", other)
    }

    pub fn or(self, other: Predicate) -> Predicate {
        self.combine("OR", other)
    }

    /// Fold predicates into a single parenthesized OR chain.
    pub fn any<I: IntoIterator<Item = Predicate>>(predicates: I) -> Option<Predicate> {
        predicates.into_iter().reduce(Predicate::or)
    }

    /// Fold predicates into a single parenthesized AND chain.
    pub fn all<I: IntoIterator<Item = Predicate>>(predicates: I) -> Option<Predicate> {
        predicates.into_iter().reduce(Predicate::and)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }

    fn combine(self, conjunction: &str, other: Predicate) -> Predicate {
        let mut params = self.params;
        params.extend(other.params);
        Predicate {
            sql: format!("({} {conjunction} {})", self.sql, other.sql),
            params,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn combinators_parenthesize_and_order_parameters() {
        let predicate = col("a")
            .gt(val(1i64))
            .or(col("a").eq(val(1i64)).and(col("b").gt(val("x"))));

        let (sql, params) = predicate.into_parts();
        assert_eq!(sql, "(a > ? OR (a = ? AND b > ?))");
        assert_eq!(
            params,
            vec![Value::Int(1), Value::Int(1), Value::from("x")]
        );
    }

    #[test]
    fn empty_membership_is_always_false() {
        let (sql, params) = col("id").in_list(Vec::<i64>::new()).into_parts();
        assert_eq!(sql, "1 = 0");
        assert!(params.is_empty());
    }
}
