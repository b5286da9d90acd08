//! Per-repository mutation lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per canonical repository path. Staging, committing,
/// pushing and pulling hold it; read-only operations do not.
#[derive(Debug, Clone, Default)]
pub struct RepoLocks {
    inner: Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>,
}

impl RepoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `repo`. Released when the guard drops.
    ///
    /// Entries nobody holds or waits on are dropped here, so the map only
    /// grows with the number of repositories in use at once.
    pub async fn acquire(&self, repo: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.retain(|path, lock| path == repo || Arc::strong_count(lock) > 1);
            map.entry(repo.to_path_buf()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Whether another task currently holds the lock for `repo`.
    pub fn is_locked(&self, repo: &Path) -> bool {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.get(repo).is_some_and(|lock| lock.try_lock().is_err())
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
