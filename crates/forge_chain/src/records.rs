//! Local history of published tokens, kept as one JSON array on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::publisher::{CreatedObject, PublishResult};

/// One successful publish, as remembered by this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployer_address: String,
    pub module_name: String,
    pub package_id: String,
    pub transaction_digest: String,
    pub package_path: PathBuf,
    #[serde(default)]
    pub created_objects: Vec<CreatedObject>,
    pub published_at: DateTime<Utc>,
}

impl DeploymentRecord {
    pub fn new(
        deployer_address: &str,
        module_name: &str,
        package_path: &Path,
        result: &PublishResult,
    ) -> Self {
        Self {
            deployer_address: deployer_address.to_string(),
            module_name: module_name.to_string(),
            package_id: result.package_id.clone(),
            transaction_digest: result.transaction_digest.clone(),
            package_path: package_path.to_path_buf(),
            created_objects: result.created_objects.clone(),
            published_at: Utc::now(),
        }
    }
}

/// Append-only deployment history backed by a JSON file.
///
/// Clones share one lock, so concurrent appends from the same process never
/// lose a record.
#[derive(Debug, Clone)]
pub struct DeploymentStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl DeploymentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: DeploymentRecord) -> Result<()> {
        let _held = self.lock.lock();
        let mut records = read_records(&self.path)?;
        info!(
            package_id = %record.package_id,
            deployer = %record.deployer_address,
            "recording deployment"
        );
        records.push(record);
        write_records(&self.path, &records)
    }

    /// Every record, oldest first.
    pub fn all(&self) -> Result<Vec<DeploymentRecord>> {
        let _held = self.lock.lock();
        read_records(&self.path)
    }

    /// Records published by `address`, oldest first. Hex case is ignored.
    pub fn by_deployer(&self, address: &str) -> Result<Vec<DeploymentRecord>> {
        let address = address.trim();
        Ok(self
            .all()?
            .into_iter()
            .filter(|r| r.deployer_address.eq_ignore_ascii_case(address))
            .collect())
    }
}

fn read_records(path: &Path) -> Result<Vec<DeploymentRecord>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write through a sibling temp file so a crash never leaves half a file.
fn write_records(path: &Path, records: &[DeploymentRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    let content = serde_json::to_string_pretty(records)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    debug!(path = %path.display(), count = records.len(), "deployments saved");
    Ok(())
}
