//! `StoreFactory` (spec.md §4.7, C8): builds the configured `Store`
//! implementation from `Config`, the single place that knows how the
//! tiers compose. Hybrid mode follows `hybrid_store.py::__init__` —
//! each optional tier is connected and health-checked independently;
//! a tier that fails either step is logged as a WARNING and the
//! dispatcher degrades to running without it, rather than failing
//! startup outright. The file tier is the only one that can never be
//! optional.

use crate::config::{Config, StorageMode};
use crate::domain::errors::StoreError;
use crate::domain::store::{HealthCheck, Store};
use crate::infrastructure::cool_store::CoolStore;
use crate::infrastructure::file_store::FileStore;
use crate::infrastructure::hot_store::HotStore;
use crate::infrastructure::hybrid::HybridStore;
use crate::infrastructure::warm_store::WarmStore;
use std::sync::Arc;
use tracing::warn;

pub struct StoreFactory;

impl StoreFactory {
    pub async fn build(config: &Config) -> Result<Arc<dyn Store>, StoreError> {
        match config.mode {
            StorageMode::File => Ok(Arc::new(FileStore::new(config.file.cache_dir.clone()))),
            StorageMode::Hot => Ok(Arc::new(HotStore::connect(&config.hot.redis_url).await?)),
            StorageMode::Warm => {
                Ok(Arc::new(WarmStore::connect(&config.warm.database_url, config.warm.max_connections).await?))
            }
            StorageMode::Cool => Ok(Arc::new(
                CoolStore::connect(
                    &config.cool.clickhouse_url,
                    &config.cool.database,
                    &config.cool.user,
                    &config.cool.password,
                )
                .await?,
            )),
            StorageMode::Hybrid => {
                let file = FileStore::new(config.file.cache_dir.clone());

                let hot = match HotStore::connect(&config.hot.redis_url).await {
                    Ok(store) if store.health_check().await => Some(store),
                    Ok(_) => {
                        warn!(backend = "hot", "failed health check at startup, disabling tier");
                        None
                    }
                    Err(e) => {
                        warn!(backend = "hot", error = %e, "failed to connect at startup, disabling tier");
                        None
                    }
                };

                let warm = match WarmStore::connect(&config.warm.database_url, config.warm.max_connections).await {
                    Ok(store) if store.health_check().await => Some(store),
                    Ok(_) => {
                        warn!(backend = "warm", "failed health check at startup, disabling tier");
                        None
                    }
                    Err(e) => {
                        warn!(backend = "warm", error = %e, "failed to connect at startup, disabling tier");
                        None
                    }
                };

                let cool = match CoolStore::connect(
                    &config.cool.clickhouse_url,
                    &config.cool.database,
                    &config.cool.user,
                    &config.cool.password,
                )
                .await
                {
                    Ok(store) if store.health_check().await => Some(store),
                    Ok(_) => {
                        warn!(backend = "cool", "failed health check at startup, disabling tier");
                        None
                    }
                    Err(e) => {
                        warn!(backend = "cool", error = %e, "failed to connect at startup, disabling tier");
                        None
                    }
                };

                Ok(Arc::new(HybridStore::new(file, hot, warm, cool, config.dual_write, config.auto_fallback)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_mode_builds_a_working_store() {
        let dir = tempdir().unwrap();
        let mut config = Config::from_env().unwrap();
        config.mode = StorageMode::File;
        config.file.cache_dir = dir.path().to_path_buf();

        let store = StoreFactory::build(&config).await.unwrap();
        assert!(store.health_check().await);
    }

    #[tokio::test]
    async fn hybrid_mode_degrades_to_file_when_databases_are_unreachable() {
        let dir = tempdir().unwrap();
        let mut config = Config::from_env().unwrap();
        config.mode = StorageMode::Hybrid;
        config.file.cache_dir = dir.path().to_path_buf();
        config.hot.redis_url = "redis://127.0.0.1:1".to_string();
        config.warm.database_url = "not-a-valid-sqlite-url".to_string();
        config.cool.clickhouse_url = "http://127.0.0.1:1".to_string();

        let store = StoreFactory::build(&config).await.unwrap();
        // The file tier alone guarantees availability, per the same
        // baseline the dispatcher's health_check enforces.
        assert!(store.health_check().await);
    }
}
