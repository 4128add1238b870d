//! Configuration module.
//!
//! Loads from environment variables, organized by tier — mirroring how
//! the wider application composes `BrokerEnvConfig`/`StrategyEnvConfig`/...
//! sub-configs into one `Config`. No hidden globals: `Config` is passed
//! explicitly into `StoreFactory::build` (spec.md §9 redesign flag).

mod cool_config;
mod file_config;
mod hot_config;
mod warm_config;

pub use cool_config::CoolConfig;
pub use file_config::FileConfig;
pub use hot_config::HotConfig;
pub use warm_config::WarmConfig;

use crate::domain::errors::StoreError;
use std::env;
use std::str::FromStr;

/// Which tier (or composition) `StoreFactory` should instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    File,
    Hot,
    Warm,
    Cool,
    Hybrid,
}

impl FromStr for StorageMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(StorageMode::File),
            "hot" => Ok(StorageMode::Hot),
            "warm" => Ok(StorageMode::Warm),
            "cool" => Ok(StorageMode::Cool),
            "hybrid" => Ok(StorageMode::Hybrid),
            other => Err(StoreError::InvalidArgument(format!(
                "invalid STORAGE_MODE: {other}. Must be one of file, hot, warm, cool, hybrid"
            ))),
        }
    }
}

/// Aggregated configuration for the storage substrate.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: StorageMode,
    pub hot: HotConfig,
    pub warm: WarmConfig,
    pub cool: CoolConfig,
    pub file: FileConfig,
    pub dual_write: bool,
    pub auto_fallback: bool,
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, StoreError> {
        let mode_str = env::var("STORAGE_MODE").unwrap_or_else(|_| "hybrid".to_string());
        let mode = StorageMode::from_str(&mode_str)?;

        Ok(Self {
            mode,
            hot: HotConfig::from_env(),
            warm: WarmConfig::from_env(),
            cool: CoolConfig::from_env(),
            file: FileConfig::from_env(),
            dual_write: env_bool("DUAL_WRITE", true),
            auto_fallback: env_bool("AUTO_FALLBACK", true),
        })
    }

    /// A human-readable, credential-redacted summary suitable for startup
    /// logging.
    pub fn redacted_summary(&self) -> String {
        format!(
            "mode={:?} dual_write={} auto_fallback={} hot={} warm={} cool={} file={}",
            self.mode,
            self.dual_write,
            self.auto_fallback,
            self.hot.redacted(),
            self.warm.redacted(),
            self.cool.redacted(),
            self.file.cache_dir.display(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing_accepts_known_values_case_insensitively() {
        assert_eq!(StorageMode::from_str("HYBRID").unwrap(), StorageMode::Hybrid);
        assert_eq!(StorageMode::from_str("file").unwrap(), StorageMode::File);
        assert!(StorageMode::from_str("bogus").is_err());
    }

    #[test]
    fn redacted_summary_never_echoes_password() {
        // SAFETY: tests run single-threaded within this crate's test binary.
        unsafe {
            env::set_var("COOL_CLICKHOUSE_PASSWORD", "supersecret");
        }
        let cfg = Config::from_env().unwrap();
        assert!(!cfg.redacted_summary().contains("supersecret"));
        unsafe {
            env::remove_var("COOL_CLICKHOUSE_PASSWORD");
        }
    }
}
