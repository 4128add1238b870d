use std::env;

/// WARM tier (relational database) connection settings.
#[derive(Debug, Clone)]
pub struct WarmConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl WarmConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("WARM_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./data/warm.db".to_string()),
            max_connections: env::var("WARM_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        }
    }

    pub fn redacted(&self) -> String {
        super::hot_config::redact_url(&self.database_url)
    }
}
