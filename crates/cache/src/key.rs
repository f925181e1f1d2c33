use xxhash_rust::xxh3::xxh3_128;

/// KeySpec is the material from which a cache key derives when the caller
/// didn't supply one explicitly.
#[derive(Debug, Clone)]
pub struct KeySpec {
    /// Rendered SQL text.
    pub sql: String,
    /// Positional parameters, in JSON form.
    pub parameters: serde_json::Value,
    /// Adapter identifier, so distinct engines never share artifacts.
    pub adapter: String,
    /// Tenant discriminator from the runtime context, if any.
    pub tenant: Option<String>,
}

impl KeySpec {
    /// Deterministic key: a hash of SQL, parameters, adapter, and tenant,
    /// prefixed with the manager's namespace.
    pub fn derive(&self, namespace: &str) -> String {
        let mut material = Vec::with_capacity(self.sql.len() + 64);
        material.extend_from_slice(self.sql.as_bytes());
        material.push(0);
        material.extend_from_slice(self.parameters.to_string().as_bytes());
        material.push(0);
        material.extend_from_slice(self.adapter.as_bytes());
        material.push(0);
        if let Some(tenant) = &self.tenant {
            material.extend_from_slice(tenant.as_bytes());
        }
        format!("{namespace}:{:032x}", xxh3_128(&material))
    }
}

#[cfg(test)]
mod test {
    use super::KeySpec;

    fn spec(sql: &str, tenant: Option<&str>) -> KeySpec {
        KeySpec {
            sql: sql.to_string(),
            parameters: serde_json::json!([1, "x"]),
            adapter: "clickhouse-http".to_string(),
            tenant: tenant.map(str::to_string),
        }
    }

    #[test]
    fn derivation_is_deterministic_and_discriminating() {
        let a = spec("SELECT 1", None).derive("q");
        assert_eq!(a, spec("SELECT 1", None).derive("q"));

        assert_ne!(a, spec("SELECT 2", None).derive("q"));
        assert_ne!(a, spec("SELECT 1", Some("org-1")).derive("q"));
        assert_ne!(
            spec("SELECT 1", Some("org-1")).derive("q"),
            spec("SELECT 1", Some("org-2")).derive("q"),
        );
    }
}
