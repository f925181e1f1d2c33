use schema::{ColumnType, Schema, Value};

use crate::{ranges, FilterCondition, FilterError, Operator};

/// Validate a condition against the schema and coerce any date values it
/// carries to canonical ISO strings. Called for every leaf added to a
/// schema-constructed filter; without a schema only the structural rules
/// (sequence shapes, between arity, tuple arity) apply.
pub fn validate_and_coerce(
    condition: &mut FilterCondition,
    schema: Option<&Schema>,
    table: Option<&str>,
) -> Result<(), FilterError> {
    validate_shape(condition)?;

    let Some(schema) = schema else {
        return Ok(());
    };
    let Some(table) = table else {
        return Ok(());
    };

    // Tuple membership and SQL references bypass per-column validation.
    if condition.operator.is_tuple_membership() || condition.operator.takes_sql_reference() {
        return Ok(());
    }

    let column_type = schema.column_type(table, &condition.column)?.clone();

    if condition.operator.is_ordering() && !column_type.is_orderable() {
        return Err(FilterError::NotOrderable {
            column: condition.column.clone(),
            column_type: column_type.to_string(),
        });
    }

    if column_type.is_date() {
        coerce_dates(&mut condition.value, &condition.column)?;
        return Ok(());
    }

    check_value(&condition.value, &column_type, &condition.column)
}

/// Structural rules that hold with or without a schema.
fn validate_shape(condition: &FilterCondition) -> Result<(), FilterError> {
    match condition.operator {
        Operator::Between => match &condition.value {
            Value::Array(items) | Value::Tuple(items)
                if items.len() == 2 && !items.iter().any(Value::is_null) =>
            {
                Ok(())
            }
            _ => Err(FilterError::BadBetween {
                column: condition.column.clone(),
            }),
        },
        op if op.is_tuple_membership() => {
            let Value::Array(tuples) = &condition.value else {
                return Err(FilterError::ExpectsSequence {
                    column: condition.column.clone(),
                    operator: op.to_string(),
                });
            };
            let mut arity = None;
            for tuple in tuples {
                let len = match tuple {
                    Value::Tuple(items) | Value::Array(items) => items.len(),
                    _ => {
                        return Err(FilterError::BadTupleArity {
                            column: condition.column.clone(),
                        })
                    }
                };
                if *arity.get_or_insert(len) != len {
                    return Err(FilterError::BadTupleArity {
                        column: condition.column.clone(),
                    });
                }
            }
            Ok(())
        }
        op if op.expects_sequence() => match &condition.value {
            Value::Array(_) => Ok(()),
            _ => Err(FilterError::ExpectsSequence {
                column: condition.column.clone(),
                operator: op.to_string(),
            }),
        },
        _ => Ok(()),
    }
}

fn check_value(value: &Value, column_type: &ColumnType, column: &str) -> Result<(), FilterError> {
    let mismatch = || FilterError::TypeMismatch {
        column: column.to_string(),
        column_type: column_type.to_string(),
        value: value.to_string(),
    };

    match value {
        // Null compares meaningfully only against Nullable columns.
        Value::Null => match column_type {
            ColumnType::Nullable(_) => Ok(()),
            _ => Err(mismatch()),
        },
        Value::Array(items) | Value::Tuple(items) => {
            for item in items {
                check_value(item, column_type, column)?;
            }
            Ok(())
        }
        Value::Bool(_) => {
            // The engine stores booleans as UInt8; accept either.
            if matches!(
                column_type.unwrap_modifiers(),
                ColumnType::Bool | ColumnType::UInt8
            ) {
                Ok(())
            } else {
                Err(mismatch())
            }
        }
        Value::Int(_) | Value::UInt(_) | Value::Float(_) => {
            if column_type.is_numeric() {
                Ok(())
            } else {
                Err(mismatch())
            }
        }
        Value::String(_) => {
            // Strings also satisfy wide-integer columns, whose host
            // representation is a decimal string.
            if column_type.is_string()
                || matches!(
                    column_type.unwrap_modifiers(),
                    ColumnType::Int128
                        | ColumnType::Int256
                        | ColumnType::UInt128
                        | ColumnType::UInt256
                        | ColumnType::Other(_)
                )
            {
                Ok(())
            } else {
                Err(mismatch())
            }
        }
    }
}

/// Rewrite string date values to canonical ISO form, recursing through
/// sequences (between endpoints, membership lists).
fn coerce_dates(value: &mut Value, column: &str) -> Result<(), FilterError> {
    match value {
        Value::String(text) => {
            *text = ranges::to_iso(ranges::parse_date(text)?);
            Ok(())
        }
        Value::Array(items) | Value::Tuple(items) => {
            for item in items {
                coerce_dates(item, column)?;
            }
            Ok(())
        }
        // Numeric epoch values pass through untouched.
        _ => Ok(()),
    }
}
