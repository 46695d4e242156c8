use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::ForgeError;

/// Tracks which package paths have a publish in flight.
///
/// Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct PublishGuard {
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PublishGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `package_path` for one publish. The claim lasts until the
    /// returned permit is dropped.
    pub async fn try_acquire(&self, package_path: &Path) -> Result<PublishPermit, ForgeError> {
        let key = guard_key(package_path).await;
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(key.clone()) {
            return Err(ForgeError::PublishInProgress(key));
        }
        debug!(path = %key.display(), "publish guard acquired");
        Ok(PublishPermit {
            key,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub async fn is_in_flight(&self, package_path: &Path) -> bool {
        let key = guard_key(package_path).await;
        self.in_flight.lock().contains(&key)
    }
}

/// Canonical form when the path exists, the path as given otherwise.
async fn guard_key(package_path: &Path) -> PathBuf {
    tokio::fs::canonicalize(package_path)
        .await
        .unwrap_or_else(|_| package_path.to_path_buf())
}

/// Releases its package path when dropped.
#[derive(Debug)]
pub struct PublishPermit {
    key: PathBuf,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PublishPermit {
    pub fn path(&self) -> &Path {
        &self.key
    }
}

impl Drop for PublishPermit {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
        debug!(path = %self.key.display(), "publish guard released");
    }
}
