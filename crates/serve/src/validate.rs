//! Endpoint input assembly and validation: the JSON body merges with
//! query parameters, and the merged object validates against the
//! endpoint's input schema.

use crate::ServeError;

/// Merge body and query parameters into the handler input. Body fields
/// win on collision; query values that parse as JSON scalars are carried
/// in parsed form so numeric parameters validate as numbers.
pub fn merge_input(
    body: Option<&serde_json::Value>,
    query: &serde_json::Map<String, serde_json::Value>,
) -> serde_json::Value {
    let mut merged = serde_json::Map::new();

    for (name, value) in query {
        let value = match value {
            serde_json::Value::String(text) => {
                serde_json::from_str(text).unwrap_or_else(|_| value.clone())
            }
            other => other.clone(),
        };
        merged.insert(name.clone(), value);
    }

    if let Some(serde_json::Value::Object(fields)) = body {
        for (name, value) in fields {
            merged.insert(name.clone(), value.clone());
        }
    }
    serde_json::Value::Object(merged)
}

/// Validate `input` against a JSON schema, surfacing each violation with
/// its instance location.
pub fn validate_input(
    schema: &serde_json::Value,
    input: &serde_json::Value,
) -> Result<(), ServeError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|err| ServeError::validation(&format!("invalid input schema: {err}")))?;

    let output = validator.apply(input).basic();
    if let jsonschema::BasicOutput::Invalid(errors) = output {
        let details: Vec<serde_json::Value> = errors
            .iter()
            .map(|error| {
                serde_json::json!({
                    "error": error.error_description().to_string(),
                    "location": error.instance_location().to_string(),
                })
            })
            .collect();

        return Err(ServeError::Validation {
            message: "input validation failed".to_string(),
            details: Some(serde_json::Value::Array(details)),
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn query_parameters_merge_under_body_fields() {
        let mut query = serde_json::Map::new();
        query.insert("limit".to_string(), serde_json::json!("25"));
        query.insert("region".to_string(), serde_json::json!("North"));

        let body = serde_json::json!({ "region": "South" });
        let merged = merge_input(Some(&body), &query);

        // The numeric-looking query value parses; the body wins collisions.
        assert_eq!(merged["limit"], serde_json::json!(25));
        assert_eq!(merged["region"], serde_json::json!("South"));
    }

    #[test]
    fn violations_carry_their_location() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": { "limit": { "type": "integer", "minimum": 1 } },
            "required": ["limit"],
        });

        validate_input(&schema, &serde_json::json!({ "limit": 10 })).unwrap();

        let err = validate_input(&schema, &serde_json::json!({ "limit": 0 })).unwrap_err();
        let ServeError::Validation { details, .. } = err else {
            panic!("expected a validation error")
        };
        let details = details.unwrap();
        assert!(details[0]["location"].as_str().unwrap().contains("limit"));
    }
}
