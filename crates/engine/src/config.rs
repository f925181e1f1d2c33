use crate::AdapterError;

/// Connection configuration for the engine's HTTP interface.
///
/// Deserializable so deployments can carry it in their own configuration
/// files; secrets are deliberately excluded from the `Debug` rendering.
#[derive(Clone, serde::Deserialize)]
pub struct Config {
    /// Base URL of the engine HTTP interface, e.g. `http://localhost:8123`.
    pub url: url::Url,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Config {
    pub fn new(url: &str) -> Result<Config, AdapterError> {
        let url = url
            .parse::<url::Url>()
            .map_err(|err| AdapterError::InvalidEndpoint(format!("{url}: {err}")))?;

        match url.scheme() {
            "http" | "https" => Ok(Config {
                url,
                database: None,
                username: None,
                password: None,
            }),
            scheme => Err(AdapterError::InvalidEndpoint(format!(
                "unsupported scheme '{scheme}'"
            ))),
        }
    }

    pub fn with_database(mut self, database: &str) -> Config {
        self.database = Some(database.to_string());
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Config {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("url", &self.url.as_str())
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
