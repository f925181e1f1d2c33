use crate::Request;

/// The immutable authentication context a strategy produces for a request.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct AuthContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Arbitrary strategy-specific claims.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub claims: serde_json::Value,
}

impl AuthContext {
    pub fn for_user(user_id: &str) -> AuthContext {
        AuthContext {
            user_id: Some(user_id.to_string()),
            claims: serde_json::Value::Null,
            ..AuthContext::default()
        }
    }

    pub fn with_roles<I: IntoIterator<Item = String>>(mut self, roles: I) -> AuthContext {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn with_scopes<I: IntoIterator<Item = String>>(mut self, scopes: I) -> AuthContext {
        self.scopes = scopes.into_iter().collect();
        self
    }

    pub fn with_tenant(mut self, tenant_id: &str) -> AuthContext {
        self.tenant_id = Some(tenant_id.to_string());
        self
    }
}

/// AuthStrategy authenticates requests. Strategies are evaluated in
/// registration order until one produces a context; `Ok(None)` means
/// "not mine", and errors are logged but don't fail the chain.
#[async_trait::async_trait]
pub trait AuthStrategy: Send + Sync {
    async fn authenticate(&self, request: &Request) -> anyhow::Result<Option<AuthContext>>;
}

/// An API-key strategy: reads a header and resolves it through a
/// caller-supplied lookup.
pub struct ApiKeyStrategy {
    header: String,
    resolve: Box<dyn Fn(&str) -> Option<AuthContext> + Send + Sync>,
}

impl ApiKeyStrategy {
    pub fn new<F>(header: &str, resolve: F) -> ApiKeyStrategy
    where
        F: Fn(&str) -> Option<AuthContext> + Send + Sync + 'static,
    {
        ApiKeyStrategy {
            header: header.to_string(),
            resolve: Box::new(resolve),
        }
    }
}

#[async_trait::async_trait]
impl AuthStrategy for ApiKeyStrategy {
    async fn authenticate(&self, request: &Request) -> anyhow::Result<Option<AuthContext>> {
        Ok(request.header(&self.header).and_then(|key| (self.resolve)(key)))
    }
}

/// An authorization predicate attached to an endpoint.
#[derive(Debug, Clone)]
pub enum AuthGuard {
    /// Any authenticated caller.
    RequireAuth,
    /// At least one of the listed roles (OR semantics).
    RequireRole(Vec<String>),
    /// Every listed scope (AND semantics).
    RequireScope(Vec<String>),
}

impl AuthGuard {
    /// Evaluate against an authenticated context. `Ok(())` or the
    /// forbidden error to surface.
    pub fn check(&self, auth: &AuthContext) -> Result<(), crate::ServeError> {
        match self {
            AuthGuard::RequireAuth => Ok(()),
            AuthGuard::RequireRole(required) => {
                if required.iter().any(|role| auth.roles.contains(role)) {
                    Ok(())
                } else {
                    Err(crate::ServeError::Forbidden {
                        message: format!("requires one of roles {required:?}"),
                        reason: "missing_role",
                        required: Some(serde_json::json!(required)),
                        actual: Some(serde_json::json!(auth.roles)),
                    })
                }
            }
            AuthGuard::RequireScope(required) => {
                if required.iter().all(|scope| auth.scopes.contains(scope)) {
                    Ok(())
                } else {
                    Err(crate::ServeError::Forbidden {
                        message: format!("requires scopes {required:?}"),
                        reason: "missing_scope",
                        required: Some(serde_json::json!(required)),
                        actual: Some(serde_json::json!(auth.scopes)),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn role_guard_is_or_scope_guard_is_and() {
        let auth = AuthContext::for_user("u1")
            .with_roles(vec!["viewer".to_string()])
            .with_scopes(vec!["read:orders".to_string(), "read:users".to_string()]);

        let roles = AuthGuard::RequireRole(vec!["admin".to_string(), "viewer".to_string()]);
        assert!(roles.check(&auth).is_ok());

        let scopes = AuthGuard::RequireScope(vec![
            "read:orders".to_string(),
            "write:orders".to_string(),
        ]);
        let err = scopes.check(&auth).unwrap_err();
        assert!(matches!(
            err,
            crate::ServeError::Forbidden {
                reason: "missing_scope",
                ..
            }
        ));
    }
}
