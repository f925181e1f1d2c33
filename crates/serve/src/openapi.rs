//! OpenAPI 3 synthesis from the registered route table, plus the HTML
//! docs page that references it. Both stay public even when a global auth
//! strategy is in effect.

use std::sync::Arc;

use crate::auth::AuthGuard;
use crate::endpoint::Endpoint;

/// Build the OpenAPI document for the registered routes.
pub fn build_document(
    title: &str,
    version: &str,
    routes: &[(String, String, Arc<Endpoint>)],
    has_auth: bool,
) -> serde_json::Value {
    let mut paths = serde_json::Map::new();

    for (method, path, endpoint) in routes {
        let operation = build_operation(endpoint, has_auth);
        let entry = paths
            .entry(path.clone())
            .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        entry
            .as_object_mut()
            .expect("path entries are objects")
            .insert(method.to_ascii_lowercase(), operation);
    }

    let mut document = serde_json::json!({
        "openapi": "3.0.3",
        "info": { "title": title, "version": version },
        "paths": paths,
    });

    if has_auth {
        document["components"] = serde_json::json!({
            "securitySchemes": {
                "bearerAuth": {
                    "type": "http",
                    "scheme": "bearer",
                }
            }
        });
    }
    document
}

fn build_operation(endpoint: &Endpoint, has_auth: bool) -> serde_json::Value {
    let mut operation = serde_json::Map::new();
    operation.insert("operationId".to_string(), serde_json::json!(endpoint.key));

    let description = describe(endpoint);
    if !description.is_empty() {
        operation.insert("description".to_string(), serde_json::json!(description));
    }

    if let Some(schema) = &endpoint.input_schema {
        operation.insert(
            "requestBody".to_string(),
            serde_json::json!({
                "required": true,
                "content": { "application/json": { "schema": schema } },
            }),
        );
    }

    let response_schema = endpoint
        .output_schema
        .clone()
        .unwrap_or(serde_json::json!({}));
    operation.insert(
        "responses".to_string(),
        serde_json::json!({
            "200": {
                "description": "Success",
                "content": { "application/json": { "schema": response_schema } },
            },
            "default": {
                "description": "Error envelope",
                "content": { "application/json": { "schema": {
                    "type": "object",
                    "properties": { "error": {
                        "type": "object",
                        "properties": {
                            "type": { "type": "string" },
                            "message": { "type": "string" },
                            "details": {},
                        },
                    } },
                } } },
            },
        }),
    );

    if has_auth && !endpoint.public {
        operation.insert(
            "security".to_string(),
            serde_json::json!([{ "bearerAuth": [] }]),
        );
    }
    serde_json::Value::Object(operation)
}

/// Endpoint metadata reflected into the operation description.
fn describe(endpoint: &Endpoint) -> String {
    let mut parts = Vec::new();
    if let Some(description) = &endpoint.description {
        parts.push(description.clone());
    }
    if !endpoint.public && !endpoint.guards.is_empty() {
        parts.push("Requires authentication.".to_string());
    }
    for guard in &endpoint.guards {
        match guard {
            AuthGuard::RequireRole(roles) => {
                parts.push(format!("Requires one of roles: {}.", roles.join(", ")));
            }
            AuthGuard::RequireScope(scopes) => {
                parts.push(format!("Requires scopes: {}.", scopes.join(", ")));
            }
            AuthGuard::RequireAuth => (),
        }
    }
    parts.join(" ")
}

/// The docs page: a minimal HTML shell referencing the OpenAPI document.
pub fn docs_html(title: &str, openapi_path: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head>
    <title>{title}</title>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
  </head>
  <body>
    <script id="api-reference" data-url="{openapi_path}"></script>
    <script src="https://cdn.jsdelivr.net/npm/@scalar/api-reference"></script>
  </body>
</html>
"#
    )
}
