use std::time::Duration;

use async_trait::async_trait;

#[derive(thiserror::Error, Debug)]
pub enum LockError {
    #[error("failed to open lock file for {name}")]
    Open {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to acquire plugin-wise exclusive lock for {name}")]
    PluginExclusive {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to acquire plugin-wise shared lock for {name}")]
    PluginShared {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to acquire exclusive lock for {name} v{version}")]
    VersionExclusive {
        name: String,
        version: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to acquire shared lock for {name} v{version}")]
    VersionShared {
        name: String,
        version: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Holds a lock until dropped.
pub struct LockGuard {
    _inner: Box<dyn Send + Sync>,
}

impl LockGuard {
    pub fn new<T: Send + Sync + 'static>(inner: T) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").finish_non_exhaustive()
    }
}

/// Outcome of the install guard: either this caller is the installer, or
/// another installer holds the version lock and this caller waited for it
/// to finish.
#[derive(Debug)]
pub enum InstallLock {
    Exclusive(LockGuard),
    Shared(LockGuard),
}

#[async_trait]
pub trait LockManager: Send + Sync {
    /// Non-blocking shared lock on `<name>.lock`.
    async fn try_lock_plugin_shared(&self, name: &str) -> Result<LockGuard, LockError>;

    /// Non-blocking exclusive lock on `<name>.lock`.
    async fn try_lock_plugin_exclusive(&self, name: &str) -> Result<LockGuard, LockError>;

    /// Tries an exclusive lock on `<name>.v<version>.lock`; when it is held
    /// elsewhere, waits up to `shared_timeout` for a shared lock instead.
    async fn acquire_install_lock(
        &self,
        name: &str,
        version: &str,
        shared_timeout: Duration,
    ) -> Result<InstallLock, LockError>;
}
