use crate::ColumnType;

/// HostRepr describes how a column type surfaces in decoded rows.
///
/// The engine's JSON output already follows this mapping: integers up to 64
/// bits arrive as JSON numbers, wider integers as strings (they exceed what
/// JSON numbers represent losslessly), and date-likes as formatted strings
/// which callers treat as timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRepr {
    Number,
    /// Integers wider than 64 bits, carried as decimal strings.
    BigIntString,
    Bool,
    String,
    Timestamp,
    Optional(Box<HostRepr>),
    Array(Box<HostRepr>),
    /// Map values; map keys are always strings.
    Map(Box<HostRepr>),
}

impl ColumnType {
    pub fn host_repr(&self) -> HostRepr {
        match self {
            ColumnType::Int8
            | ColumnType::Int16
            | ColumnType::Int32
            | ColumnType::Int64
            | ColumnType::UInt8
            | ColumnType::UInt16
            | ColumnType::UInt32
            | ColumnType::UInt64
            | ColumnType::Float32
            | ColumnType::Float64
            | ColumnType::Decimal { .. } => HostRepr::Number,

            ColumnType::Int128 | ColumnType::Int256 | ColumnType::UInt128 | ColumnType::UInt256 => {
                HostRepr::BigIntString
            }

            ColumnType::Bool => HostRepr::Bool,
            ColumnType::String | ColumnType::FixedString(_) | ColumnType::Other(_) => {
                HostRepr::String
            }

            ColumnType::Date
            | ColumnType::Date32
            | ColumnType::DateTime { .. }
            | ColumnType::DateTime64 { .. } => HostRepr::Timestamp,

            ColumnType::Nullable(inner) => HostRepr::Optional(Box::new(inner.host_repr())),
            ColumnType::Array(inner) => HostRepr::Array(Box::new(inner.host_repr())),
            ColumnType::Map(_, value) => HostRepr::Map(Box::new(value.host_repr())),
            ColumnType::LowCardinality(inner) => inner.host_repr(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wide_integers_map_to_strings() {
        assert_eq!(ColumnType::UInt64.host_repr(), HostRepr::Number);
        assert_eq!(ColumnType::UInt128.host_repr(), HostRepr::BigIntString);
        assert_eq!(ColumnType::Int256.host_repr(), HostRepr::BigIntString);
    }

    #[test]
    fn containers_recurse() {
        let ty = ColumnType::parse("Map(String, Array(Nullable(UInt128)))");
        assert_eq!(
            ty.host_repr(),
            HostRepr::Map(Box::new(HostRepr::Array(Box::new(HostRepr::Optional(
                Box::new(HostRepr::BigIntString)
            )))))
        );
    }
}
