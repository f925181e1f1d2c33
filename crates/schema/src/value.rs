use std::fmt;

/// Value is a positional query parameter.
///
/// Values are collected in placeholder order while a query renders, travel
/// with the SQL text to the adapter, and quote themselves into literals for
/// engines whose HTTP surface takes no positional parameters.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    /// Tuples only arise from tuple-membership operators; they deserialize
    /// as arrays and are distinguished structurally by the operator.
    Tuple(Vec<Value>),
}

impl Value {
    /// Render this value as a safely quoted SQL literal. Strings escape
    /// backslashes and single quotes; booleans render 0/1; dates are
    /// already canonical ISO strings by the time they land here.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "1".to_string(),
            Value::Bool(false) => "0".to_string(),
            Value::Int(n) => n.to_string(),
            Value::UInt(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::String(s) => {
                let escaped = s.replace('\\', "\\\\").replace('\'', "\\'");
                format!("'{escaped}'")
            }
            Value::Array(items) => {
                let items: Vec<String> = items.iter().map(Value::to_sql_literal).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Tuple(items) => {
                let items: Vec<String> = items.iter().map(Value::to_sql_literal).collect();
                format!("({})", items.join(", "))
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert a JSON value into a parameter value.
    pub fn from_json(value: serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            // Objects have no parameter form; carry their JSON text.
            other @ serde_json::Value::Object(_) => Value::String(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_sql_literal())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v as u64)
    }
}
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod test {
    use super::Value;

    #[test]
    fn literals_quote_safely() {
        assert_eq!(Value::from("O'Brien").to_sql_literal(), r"'O\'Brien'");
        assert_eq!(Value::from(r"a\b").to_sql_literal(), r"'a\\b'");
        assert_eq!(Value::Null.to_sql_literal(), "NULL");
        assert_eq!(Value::from(true).to_sql_literal(), "1");
        assert_eq!(Value::from(vec![1i64, 2]).to_sql_literal(), "[1, 2]");
        assert_eq!(
            Value::Tuple(vec![Value::from(1i64), Value::from("x")]).to_sql_literal(),
            "(1, 'x')"
        );
    }

    #[test]
    fn json_round_trip() {
        let value = Value::from_json(serde_json::json!([1, "two", null, 3.5]));
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Int(1),
                Value::String("two".to_string()),
                Value::Null,
                Value::Float(3.5),
            ])
        );
        assert_eq!(value.to_json(), serde_json::json!([1, "two", null, 3.5]));
    }
}
