use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use super::errors::CrlResult;
use super::types::StoredCrl;

/// Durable storage for the last known good CRL set.
///
/// The whole issuer-keyed map is serialized to a single JSON file;
/// replacement is atomic via a temp file and rename. Written only from the
/// manager's background worker.
#[derive(Debug, Clone)]
pub struct PersistedCrlStore {
    path: PathBuf,
}

impl PersistedCrlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the previously stored CRL set. A missing file is an empty set.
    pub async fn load(&self) -> CrlResult<HashMap<String, StoredCrl>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            debug!(
                "No persisted CRL store at {:?}, starting with an empty set",
                self.path
            );
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(&self.path).await?;
        let crls: HashMap<String, StoredCrl> = serde_json::from_str(&content)?;
        info!("Loaded {} stored CRLs from {:?}", crls.len(), self.path);
        Ok(crls)
    }

    /// Replace the stored set atomically.
    pub async fn save(&self, crls: &HashMap<String, StoredCrl>) -> CrlResult<()> {
        let content = serde_json::to_string(crls)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!("Persisted {} stored CRLs to {:?}", crls.len(), self.path);
        Ok(())
    }
}
