use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::application::ports::lock_manager::{InstallLock, LockError, LockGuard, LockManager};
use crate::infrastructure::locking::{plugin_lock_key, version_lock_key};

/// Lock manager for single-process embeddings and tests: one tokio
/// `RwLock` per lock key instead of a lock file.
#[derive(Default)]
pub struct InProcessLockManager {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl InProcessLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: String) -> Arc<RwLock<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(key).or_default().clone()
    }
}

#[async_trait]
impl LockManager for InProcessLockManager {
    async fn try_lock_plugin_shared(&self, name: &str) -> Result<LockGuard, LockError> {
        let guard = self
            .lock_for(plugin_lock_key(name))
            .try_read_owned()
            .map_err(|e| LockError::PluginShared {
                name: name.to_string(),
                source: anyhow!(e),
            })?;
        Ok(LockGuard::new(guard))
    }

    async fn try_lock_plugin_exclusive(&self, name: &str) -> Result<LockGuard, LockError> {
        let guard = self
            .lock_for(plugin_lock_key(name))
            .try_write_owned()
            .map_err(|e| LockError::PluginExclusive {
                name: name.to_string(),
                source: anyhow!(e),
            })?;
        Ok(LockGuard::new(guard))
    }

    async fn acquire_install_lock(
        &self,
        name: &str,
        version: &str,
        shared_timeout: Duration,
    ) -> Result<InstallLock, LockError> {
        let lock = self.lock_for(version_lock_key(name, version));
        if let Ok(guard) = lock.clone().try_write_owned() {
            return Ok(InstallLock::Exclusive(LockGuard::new(guard)));
        }
        let guard = tokio::time::timeout(shared_timeout, lock.read_owned())
            .await
            .map_err(|e| LockError::VersionShared {
                name: name.to_string(),
                version: version.to_string(),
                source: anyhow!(e),
            })?;
        Ok(InstallLock::Shared(LockGuard::new(guard)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn contended_install_waits_for_shared() {
        let locks = Arc::new(InProcessLockManager::new());
        let first = locks
            .acquire_install_lock("demo", "1.0", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(matches!(first, InstallLock::Exclusive(_)));

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                locks
                    .acquire_install_lock("demo", "1.0", Duration::from_secs(5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(first);
        let second = waiter.await.unwrap().unwrap();
        assert!(matches!(second, InstallLock::Shared(_)));
    }

    #[tokio::test]
    async fn plugin_locks_exclude_each_other() {
        let locks = InProcessLockManager::new();
        let _shared = locks.try_lock_plugin_shared("demo").await.unwrap();
        assert!(locks.try_lock_plugin_shared("demo").await.is_ok());
        assert!(matches!(
            locks.try_lock_plugin_exclusive("demo").await,
            Err(LockError::PluginExclusive { .. })
        ));
    }
}
