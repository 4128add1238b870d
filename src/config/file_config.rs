use std::env;
use std::path::PathBuf;

/// File tier (durable fallback / standalone store) settings.
#[derive(Debug, Clone)]
pub struct FileConfig {
    pub cache_dir: PathBuf,
}

impl FileConfig {
    pub fn from_env() -> Self {
        Self {
            cache_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/cache")),
        }
    }
}
