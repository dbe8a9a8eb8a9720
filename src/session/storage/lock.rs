//! Exclusive advisory lock that keeps a second process off the store.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::session::core::errors::{ChatError, ChatResult};

/// Held lock on the store; released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the lock at `path`, retrying every `retry` until `timeout` has passed.
    ///
    /// # Errors
    /// Returns [`ChatError::AlreadyRunning`] if another holder keeps the lock past the
    /// timeout, or [`ChatError::Io`] if the lock file cannot be opened or locked.
    pub async fn acquire(path: &Path, timeout: Duration, retry: Duration) -> ChatResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        let deadline = Instant::now() + timeout;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!("Acquired store lock {}", path.display());
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(err) if is_contended(&err) => {
                    if Instant::now() >= deadline {
                        return Err(ChatError::AlreadyRunning);
                    }
                    tokio::time::sleep(retry).await;
                }
                Err(err) => return Err(ChatError::Io(err)),
            }
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!("Failed to release store lock {}: {err}", self.path.display());
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(150);
    const RETRY: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_second_holder_is_refused() {
        let dir = tempfile::tempdir().ok().unwrap_or_else(|| unreachable!());
        let path = dir.path().join("history.db");

        let first = StoreLock::acquire(&path, TIMEOUT, RETRY).await;
        assert!(first.is_ok());

        let second = StoreLock::acquire(&path, TIMEOUT, RETRY).await;
        assert!(matches!(second, Err(ChatError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn test_lock_is_released_on_drop() {
        let dir = tempfile::tempdir().ok().unwrap_or_else(|| unreachable!());
        let path = dir.path().join("history.db.lock");

        let first = StoreLock::acquire(&path, TIMEOUT, RETRY).await;
        assert!(first.as_ref().is_ok_and(|lock| lock.path() == path));
        drop(first);

        assert!(StoreLock::acquire(&path, TIMEOUT, RETRY).await.is_ok());
    }

    #[tokio::test]
    async fn test_unopenable_path_is_io_error() {
        let dir = tempfile::tempdir().ok().unwrap_or_else(|| unreachable!());
        let path = dir.path().join("missing").join("history.db");

        let result = StoreLock::acquire(&path, TIMEOUT, RETRY).await;
        assert!(matches!(result, Err(ChatError::Io(_))));
    }
}
