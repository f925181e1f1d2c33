use std::fmt;

/// ColumnType is a parsed column type drawn from the engine's vocabulary.
///
/// Parsing is total: type text this model doesn't know is preserved as
/// `Other` so that introspected schemas always load, and `Display` renders
/// every variant back to the engine's own spelling.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColumnType {
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    Int256,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    UInt256,
    Float32,
    Float64,
    Decimal {
        precision: u8,
        scale: u8,
    },
    Bool,
    String,
    FixedString(usize),
    Date,
    Date32,
    DateTime {
        timezone: Option<std::string::String>,
    },
    DateTime64 {
        precision: u8,
        timezone: Option<std::string::String>,
    },
    Array(Box<ColumnType>),
    Nullable(Box<ColumnType>),
    Map(Box<ColumnType>, Box<ColumnType>),
    LowCardinality(Box<ColumnType>),
    /// Engine type text that this model doesn't structurally understand.
    Other(std::string::String),
}

impl ColumnType {
    /// Parse the engine's type text, for example `Nullable(Array(String))`
    /// or `DateTime64(3, 'UTC')`.
    pub fn parse(text: &str) -> ColumnType {
        let text = text.trim();

        if let Some(inner) = wrapped(text, "Nullable") {
            return ColumnType::Nullable(Box::new(ColumnType::parse(inner)));
        }
        if let Some(inner) = wrapped(text, "Array") {
            return ColumnType::Array(Box::new(ColumnType::parse(inner)));
        }
        if let Some(inner) = wrapped(text, "LowCardinality") {
            return ColumnType::LowCardinality(Box::new(ColumnType::parse(inner)));
        }
        if let Some(inner) = wrapped(text, "Map") {
            if let Some((key, value)) = split_top_level(inner) {
                return ColumnType::Map(
                    Box::new(ColumnType::parse(key)),
                    Box::new(ColumnType::parse(value)),
                );
            }
        }
        if let Some(inner) = wrapped(text, "FixedString") {
            if let Ok(n) = inner.trim().parse::<usize>() {
                return ColumnType::FixedString(n);
            }
        }
        if let Some(inner) = wrapped(text, "Decimal") {
            if let Some((p, s)) = split_top_level(inner) {
                if let (Ok(precision), Ok(scale)) =
                    (p.trim().parse::<u8>(), s.trim().parse::<u8>())
                {
                    return ColumnType::Decimal { precision, scale };
                }
            }
        }
        if let Some(inner) = wrapped(text, "DateTime64") {
            let (precision, timezone) = match split_top_level(inner) {
                Some((p, tz)) => (p.trim().to_string(), Some(unquote(tz))),
                None => (inner.trim().to_string(), None),
            };
            if let Ok(precision) = precision.parse::<u8>() {
                return ColumnType::DateTime64 {
                    precision,
                    timezone,
                };
            }
        }
        if let Some(inner) = wrapped(text, "DateTime") {
            return ColumnType::DateTime {
                timezone: Some(unquote(inner)),
            };
        }

        match text {
            "Int8" => ColumnType::Int8,
            "Int16" => ColumnType::Int16,
            "Int32" => ColumnType::Int32,
            "Int64" => ColumnType::Int64,
            "Int128" => ColumnType::Int128,
            "Int256" => ColumnType::Int256,
            "UInt8" => ColumnType::UInt8,
            "UInt16" => ColumnType::UInt16,
            "UInt32" => ColumnType::UInt32,
            "UInt64" => ColumnType::UInt64,
            "UInt128" => ColumnType::UInt128,
            "UInt256" => ColumnType::UInt256,
            "Float32" => ColumnType::Float32,
            "Float64" => ColumnType::Float64,
            "Bool" | "Boolean" => ColumnType::Bool,
            "String" => ColumnType::String,
            "Date" => ColumnType::Date,
            "Date32" => ColumnType::Date32,
            "DateTime" => ColumnType::DateTime { timezone: None },
            other => ColumnType::Other(other.to_string()),
        }
    }

    /// Strip `Nullable` and `LowCardinality` modifiers down to the
    /// underlying storage type.
    pub fn unwrap_modifiers(&self) -> &ColumnType {
        match self {
            ColumnType::Nullable(inner) | ColumnType::LowCardinality(inner) => {
                inner.unwrap_modifiers()
            }
            other => other,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self.unwrap_modifiers(),
            ColumnType::Int8
                | ColumnType::Int16
                | ColumnType::Int32
                | ColumnType::Int64
                | ColumnType::Int128
                | ColumnType::Int256
                | ColumnType::UInt8
                | ColumnType::UInt16
                | ColumnType::UInt32
                | ColumnType::UInt64
                | ColumnType::UInt128
                | ColumnType::UInt256
                | ColumnType::Float32
                | ColumnType::Float64
                | ColumnType::Decimal { .. }
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(
            self.unwrap_modifiers(),
            ColumnType::String | ColumnType::FixedString(_)
        )
    }

    pub fn is_date(&self) -> bool {
        matches!(
            self.unwrap_modifiers(),
            ColumnType::Date
                | ColumnType::Date32
                | ColumnType::DateTime { .. }
                | ColumnType::DateTime64 { .. }
        )
    }

    /// Whether values of this type admit a total order usable in
    /// comparison predicates. Containers don't.
    pub fn is_orderable(&self) -> bool {
        !matches!(
            self.unwrap_modifiers(),
            ColumnType::Array(_) | ColumnType::Map(..)
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int8 => write!(f, "Int8"),
            ColumnType::Int16 => write!(f, "Int16"),
            ColumnType::Int32 => write!(f, "Int32"),
            ColumnType::Int64 => write!(f, "Int64"),
            ColumnType::Int128 => write!(f, "Int128"),
            ColumnType::Int256 => write!(f, "Int256"),
            ColumnType::UInt8 => write!(f, "UInt8"),
            ColumnType::UInt16 => write!(f, "UInt16"),
            ColumnType::UInt32 => write!(f, "UInt32"),
            ColumnType::UInt64 => write!(f, "UInt64"),
            ColumnType::UInt128 => write!(f, "UInt128"),
            ColumnType::UInt256 => write!(f, "UInt256"),
            ColumnType::Float32 => write!(f, "Float32"),
            ColumnType::Float64 => write!(f, "Float64"),
            ColumnType::Decimal { precision, scale } => {
                write!(f, "Decimal({precision}, {scale})")
            }
            ColumnType::Bool => write!(f, "Bool"),
            ColumnType::String => write!(f, "String"),
            ColumnType::FixedString(n) => write!(f, "FixedString({n})"),
            ColumnType::Date => write!(f, "Date"),
            ColumnType::Date32 => write!(f, "Date32"),
            ColumnType::DateTime { timezone: None } => write!(f, "DateTime"),
            ColumnType::DateTime { timezone: Some(tz) } => write!(f, "DateTime('{tz}')"),
            ColumnType::DateTime64 {
                precision,
                timezone: None,
            } => write!(f, "DateTime64({precision})"),
            ColumnType::DateTime64 {
                precision,
                timezone: Some(tz),
            } => write!(f, "DateTime64({precision}, '{tz}')"),
            ColumnType::Array(inner) => write!(f, "Array({inner})"),
            ColumnType::Nullable(inner) => write!(f, "Nullable({inner})"),
            ColumnType::Map(key, value) => write!(f, "Map({key}, {value})"),
            ColumnType::LowCardinality(inner) => write!(f, "LowCardinality({inner})"),
            ColumnType::Other(text) => write!(f, "{text}"),
        }
    }
}

// ColumnType serializes as the engine's type text, which keeps schema
// artifacts produced by introspection directly loadable.
impl serde::Serialize for ColumnType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ColumnType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = std::string::String::deserialize(deserializer)?;
        Ok(ColumnType::parse(&text))
    }
}

/// If `text` is `name(inner)`, return `inner`.
fn wrapped<'t>(text: &'t str, name: &str) -> Option<&'t str> {
    let rest = text.strip_prefix(name)?;
    let rest = rest.strip_prefix('(')?;
    rest.strip_suffix(')')
}

/// Split `text` on the first comma not nested within parentheses.
fn split_top_level(text: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (at, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return Some((&text[..at], &text[at + 1..])),
            _ => (),
        }
    }
    None
}

fn unquote(text: &str) -> String {
    text.trim().trim_matches('\'').to_string()
}

#[cfg(test)]
mod test {
    use super::ColumnType;

    #[test]
    fn parse_round_trips_composed_types() {
        for text in [
            "Int64",
            "UInt256",
            "Decimal(18, 4)",
            "FixedString(16)",
            "DateTime('UTC')",
            "DateTime64(3, 'America/New_York')",
            "Array(Nullable(String))",
            "Map(String, UInt64)",
            "LowCardinality(String)",
            "Nullable(DateTime64(6))",
        ] {
            let parsed = ColumnType::parse(text);
            assert_eq!(parsed.to_string(), text, "for {text}");
        }
    }

    #[test]
    fn unknown_types_are_preserved() {
        let parsed = ColumnType::parse("AggregateFunction(sum, UInt64)");
        assert_eq!(
            parsed,
            ColumnType::Other("AggregateFunction(sum, UInt64)".to_string())
        );
        assert_eq!(parsed.to_string(), "AggregateFunction(sum, UInt64)");
    }

    #[test]
    fn modifiers_unwrap_for_classification() {
        let ty = ColumnType::parse("LowCardinality(Nullable(FixedString(8)))");
        assert!(ty.is_string());
        assert!(ty.is_orderable());
        assert!(!ty.is_numeric());

        assert!(!ColumnType::parse("Array(UInt8)").is_orderable());
        assert!(ColumnType::parse("Nullable(DateTime)").is_date());
    }
}
