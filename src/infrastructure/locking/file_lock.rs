use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use fs2::FileExt;
use tokio::time::{Instant, sleep};

use crate::application::ports::lock_manager::{InstallLock, LockError, LockGuard, LockManager};
use crate::infrastructure::locking::{plugin_lock_key, version_lock_key};

const SHARED_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Advisory `flock`-style locks on files under one directory. Valid across
/// processes; a lock is released when its file handle is closed.
pub struct FileLockManager {
    dir: PathBuf,
}

struct HeldLock {
    file: Arc<File>,
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&*self.file);
    }
}

#[derive(Clone, Copy)]
enum Mode {
    Shared,
    Exclusive,
}

/// `true` when the lock is held by someone else, as opposed to an I/O error.
fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl FileLockManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn open(&self, key: &str, name: &str) -> Result<Arc<File>, LockError> {
        let dir = self.dir.clone();
        let path = self.dir.join(key);
        let opened = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir)?;
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
        })
        .await
        .unwrap_or_else(|join| Err(io::Error::other(join)));
        opened.map(Arc::new).map_err(|source| LockError::Open {
            name: name.to_string(),
            source: anyhow!(source),
        })
    }

    /// Non-blocking attempt, run off the async workers.
    async fn try_lock(file: &Arc<File>, mode: Mode) -> io::Result<()> {
        let file = file.clone();
        tokio::task::spawn_blocking(move || match mode {
            Mode::Shared => FileExt::try_lock_shared(&*file),
            Mode::Exclusive => FileExt::try_lock_exclusive(&*file),
        })
        .await
        .unwrap_or_else(|join| Err(io::Error::other(join)))
    }

    async fn wait_shared(file: &Arc<File>, timeout: Duration) -> io::Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            match Self::try_lock(file, Mode::Shared).await {
                Ok(()) => return Ok(()),
                Err(err) if is_contended(&err) && Instant::now() < deadline => {
                    sleep(SHARED_POLL_INTERVAL).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl LockManager for FileLockManager {
    async fn try_lock_plugin_shared(&self, name: &str) -> Result<LockGuard, LockError> {
        let file = self.open(&plugin_lock_key(name), name).await?;
        Self::try_lock(&file, Mode::Shared)
            .await
            .map_err(|source| LockError::PluginShared {
                name: name.to_string(),
                source: anyhow!(source),
            })?;
        Ok(LockGuard::new(HeldLock { file }))
    }

    async fn try_lock_plugin_exclusive(&self, name: &str) -> Result<LockGuard, LockError> {
        let file = self.open(&plugin_lock_key(name), name).await?;
        Self::try_lock(&file, Mode::Exclusive)
            .await
            .map_err(|source| LockError::PluginExclusive {
                name: name.to_string(),
                source: anyhow!(source),
            })?;
        Ok(LockGuard::new(HeldLock { file }))
    }

    async fn acquire_install_lock(
        &self,
        name: &str,
        version: &str,
        shared_timeout: Duration,
    ) -> Result<InstallLock, LockError> {
        let file = self.open(&version_lock_key(name, version), name).await?;
        match Self::try_lock(&file, Mode::Exclusive).await {
            Ok(()) => {
                tracing::debug!(plugin = name, version, "install_lock_exclusive");
                return Ok(InstallLock::Exclusive(LockGuard::new(HeldLock { file })));
            }
            Err(err) if is_contended(&err) => {
                tracing::info!(plugin = name, version, "install_lock_held_elsewhere_waiting");
            }
            Err(err) => {
                return Err(LockError::VersionExclusive {
                    name: name.to_string(),
                    version: version.to_string(),
                    source: anyhow!(err),
                });
            }
        }
        Self::wait_shared(&file, shared_timeout)
            .await
            .map_err(|source| LockError::VersionShared {
                name: name.to_string(),
                version: version.to_string(),
                source: anyhow!(source),
            })?;
        Ok(InstallLock::Shared(LockGuard::new(HeldLock { file })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn second_installer_falls_back_to_shared_after_release() {
        let temp = TempDir::new().unwrap();
        let locks = FileLockManager::new(temp.path());
        let first = locks
            .acquire_install_lock("demo", "1.0", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(matches!(first, InstallLock::Exclusive(_)));

        let release = tokio::spawn(async move {
            sleep(Duration::from_millis(300)).await;
            drop(first);
        });
        let second = locks
            .acquire_install_lock("demo", "1.0", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(matches!(second, InstallLock::Shared(_)));
        release.await.unwrap();
    }

    #[tokio::test]
    async fn shared_wait_times_out() {
        let temp = TempDir::new().unwrap();
        let locks = FileLockManager::new(temp.path());
        let _held = locks
            .acquire_install_lock("demo", "1.0", Duration::ZERO)
            .await
            .unwrap();
        let err = locks
            .acquire_install_lock("demo", "1.0", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::VersionShared { .. }));
    }

    #[tokio::test]
    async fn lock_dir_is_created_on_first_use() {
        let temp = TempDir::new().unwrap();
        let locks = FileLockManager::new(temp.path().join("nested").join("locks"));
        let _held = locks.try_lock_plugin_exclusive("demo").await.unwrap();
        assert!(locks.dir().join(plugin_lock_key("demo")).is_file());
    }

    #[tokio::test]
    async fn exclusive_plugin_lock_blocks_shared() {
        let temp = TempDir::new().unwrap();
        let locks = FileLockManager::new(temp.path());
        let _ex = locks.try_lock_plugin_exclusive("demo").await.unwrap();
        assert!(matches!(
            locks.try_lock_plugin_shared("demo").await,
            Err(LockError::PluginShared { .. })
        ));
        assert!(locks.try_lock_plugin_shared("other").await.is_ok());
    }
}
