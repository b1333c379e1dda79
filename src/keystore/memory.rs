use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::fs;
use walkdir::WalkDir;

use super::entry::{CertificateEntry, KeystoreEntry};
use super::{Keystore, KeystoreError};

/// In-memory keystore implementation.
///
/// Entries live in memory; trusted certificates can be preloaded from a
/// directory of DER files. Useful for development and testing, and as the
/// backing store behind [`KeystoreService`](super::KeystoreService).
#[derive(Debug, Clone)]
pub struct MemoryKeystore {
    password: Arc<String>,
    entries: Arc<DashMap<String, KeystoreEntry>>,
}

impl MemoryKeystore {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: Arc::new(password.into()),
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Create a store preloaded with the trusted certificates found under
    /// `base_path`. Files with .der, .pem, or .crt extensions are read as
    /// DER; unreadable files are skipped.
    pub async fn with_certificates_dir(
        password: impl Into<String>,
        base_path: impl Into<PathBuf>,
    ) -> Result<Self, KeystoreError> {
        let store = Self::new(password);
        store.load_from_disk(base_path.into()).await?;
        Ok(store)
    }

    /// Return the amount of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn load_from_disk(&self, base_path: PathBuf) -> Result<(), KeystoreError> {
        let mut count = 0;

        for entry in WalkDir::new(&base_path) {
            let entry = entry?;
            let path = entry.path();

            if path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| {
                    ext.eq_ignore_ascii_case("der")
                        || ext.eq_ignore_ascii_case("pem")
                        || ext.eq_ignore_ascii_case("crt")
                })
                && let Ok(der_bytes) = fs::read(path).await
                && let Ok(cert_entry) = CertificateEntry::from_der(der_bytes)
            {
                let alias = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or(&cert_entry.serial_number)
                    .to_string();
                self.entries
                    .insert(alias, KeystoreEntry::TrustedCertificate(cert_entry));
                count += 1;
            }
        }
        tracing::info!("Loaded {count} trusted certificates from disk");
        Ok(())
    }

    fn check_alias(alias: &str) -> Result<(), KeystoreError> {
        if alias.trim().is_empty() {
            return Err(KeystoreError::InvalidArgument(
                "alias cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Keystore for MemoryKeystore {
    async fn get_entry(
        &self,
        alias: &str,
        password: Option<&str>,
    ) -> Result<Option<KeystoreEntry>, KeystoreError> {
        Self::check_alias(alias)?;

        let Some(entry) = self.entries.get(alias) else {
            return Ok(None);
        };

        if entry.value().is_password_protected() && password != Some(self.password.as_str()) {
            return Err(KeystoreError::WrongPassword(alias.to_string()));
        }

        Ok(Some(entry.value().clone()))
    }

    async fn set_entry(&self, alias: &str, entry: KeystoreEntry) -> Result<(), KeystoreError> {
        Self::check_alias(alias)?;
        self.entries.insert(alias.to_string(), entry);
        Ok(())
    }

    async fn delete_entry(&self, alias: &str) -> Result<Option<KeystoreEntry>, KeystoreError> {
        Self::check_alias(alias)?;
        Ok(self.entries.remove(alias).map(|(_, entry)| entry))
    }

    async fn aliases(&self) -> Result<Vec<String>, KeystoreError> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }

    async fn entries(&self) -> Result<Vec<(String, KeystoreEntry)>, KeystoreError> {
        Ok(self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect())
    }
}
