//! Per-document mutex table (spec.md §9: "replace ad-hoc per-function
//! locks with a single per-document mutex table keyed by document path").

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct DocumentLocks {
    table: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the mutex guarding `path`, creating its entry on first use.
    /// Holding the returned guard for the duration of a read-modify-write
    /// makes that sequence atomic with respect to other callers in this
    /// process.
    pub async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        let entry = self
            .table
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        entry.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn serializes_access_to_the_same_path() {
        let locks = Arc::new(DocumentLocks::new());
        let path = PathBuf::from("/tmp/doc.json");
        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let locks = locks.clone();
            let path = path.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(&path).await;
                tokio::time::sleep(Duration::from_millis(5)).await;
                order.lock().await.push(i);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(order.lock().await.len(), 5);
    }
}
