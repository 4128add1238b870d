use std::env;

/// COOL tier (columnar time-series database) connection settings.
#[derive(Debug, Clone)]
pub struct CoolConfig {
    pub clickhouse_url: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl CoolConfig {
    pub fn from_env() -> Self {
        Self {
            clickhouse_url: env::var("COOL_CLICKHOUSE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8123".to_string()),
            database: env::var("COOL_CLICKHOUSE_DATABASE").unwrap_or_else(|_| "trading".to_string()),
            user: env::var("COOL_CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string()),
            password: env::var("COOL_CLICKHOUSE_PASSWORD").unwrap_or_default(),
        }
    }

    pub fn redacted(&self) -> String {
        format!(
            "{} db={} user={} password={}",
            self.clickhouse_url,
            self.database,
            self.user,
            if self.password.is_empty() { "" } else { "***" }
        )
    }
}
