use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::CrlConfig;
use crate::crl::{ChangeListener, CrlError, CrlManager, RevocationStore, StoredCrl};

use super::entry::KeystoreEntry;
use super::{Keystore, KeystoreError, signing};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Keystore(#[from] KeystoreError),

    #[error(transparent)]
    Crl(#[from] CrlError),
}

/// The owning component: a credential store plus optional CRL management.
///
/// Trusted certificate entries written through this service are forwarded
/// to the CRL manager, so their distribution points get watched; removing
/// such an entry withdraws them. A single change listener is notified both
/// for direct store mutations and, through the CRL manager, for refresh
/// cycles that changed revocation data.
pub struct KeystoreService<K: Keystore> {
    keystore: K,
    password: String,
    change_listener: ChangeListener,
    crl_options: Mutex<CrlConfig>,
    crl_manager: RwLock<Option<Arc<CrlManager>>>,
    default_crl_store_path: PathBuf,
}

impl<K: Keystore> KeystoreService<K> {
    /// Build the service; when CRL management is enabled in `options` the
    /// background manager is started immediately, seeded with every trusted
    /// certificate already present in the keystore.
    pub async fn new(
        keystore: K,
        password: impl Into<String>,
        options: CrlConfig,
        default_crl_store_path: impl Into<PathBuf>,
        change_listener: ChangeListener,
    ) -> Result<Self, ServiceError> {
        let service = Self {
            keystore,
            password: password.into(),
            change_listener,
            crl_options: Mutex::new(options),
            crl_manager: RwLock::new(None),
            default_crl_store_path: default_crl_store_path.into(),
        };

        service.rebuild_crl_manager().await?;
        Ok(service)
    }

    /// Apply new CRL options, tearing down and rebuilding the manager when
    /// they differ from the current ones.
    pub async fn update(&self, new_options: CrlConfig) -> Result<(), ServiceError> {
        {
            let mut options = self.crl_options.lock().await;
            if *options == new_options {
                return Ok(());
            }
            info!("CRL options changed, rebuilding CRL manager");
            *options = new_options;
        }

        self.rebuild_crl_manager().await
    }

    async fn rebuild_crl_manager(&self) -> Result<(), ServiceError> {
        self.shutdown_crl_manager().await;

        let options = self.crl_options.lock().await.clone();
        if !options.enabled {
            return Ok(());
        }

        let store_path = options
            .store_path
            .clone()
            .unwrap_or_else(|| self.default_crl_store_path.clone());

        let manager = CrlManager::new(&options, store_path).await?;
        manager
            .set_listener(Some(self.change_listener.clone()))
            .await;

        for uri in &options.distribution_points {
            manager
                .add_distribution_point(BTreeSet::from([uri.clone()]))
                .await;
        }

        match self.keystore.entries().await {
            Ok(entries) => {
                for (_, entry) in entries {
                    if let Some(cert) = entry.as_trusted_certificate()
                        && let Err(e) = manager.add_trusted_certificate(&cert.raw).await
                    {
                        warn!("Failed to add trusted certificate {} to CRL manager: {}", cert.subject, e);
                    }
                }
            }
            Err(e) => warn!("Failed to seed CRL manager with current trusted certificates: {}", e),
        }

        *self.crl_manager.write().await = Some(Arc::new(manager));
        Ok(())
    }

    async fn shutdown_crl_manager(&self) {
        if let Some(manager) = self.crl_manager.write().await.take() {
            manager.close();
        }
    }

    /// Get an entry, releasing password-protected material with the
    /// service's own store password.
    pub async fn get_entry(&self, alias: &str) -> Result<Option<KeystoreEntry>, KeystoreError> {
        self.keystore.get_entry(alias, Some(&self.password)).await
    }

    pub async fn aliases(&self) -> Result<Vec<String>, KeystoreError> {
        self.keystore.aliases().await
    }

    /// Insert or replace an entry.
    ///
    /// Trusted certificates are handed to the CRL manager; when that
    /// changes the watched distribution point set, the change event is
    /// deferred to the CRL refresh cycle that downloads the new data.
    pub async fn set_entry(&self, alias: &str, entry: KeystoreEntry) -> Result<(), KeystoreError> {
        self.keystore.set_entry(alias, entry.clone()).await?;

        if !self.try_add_to_crl_management(&entry).await {
            self.post_changed_event();
        }
        Ok(())
    }

    pub async fn delete_entry(&self, alias: &str) -> Result<(), KeystoreError> {
        let Some(entry) = self.keystore.delete_entry(alias).await? else {
            return Ok(());
        };

        self.try_remove_from_crl_management(&entry).await;
        self.post_changed_event();
        Ok(())
    }

    /// Generate a key pair with a self-signed chain and store it under
    /// `alias`.
    pub async fn create_key_pair(
        &self,
        alias: &str,
        common_name: &str,
    ) -> Result<(), KeystoreError> {
        let entry = signing::create_key_pair(common_name)?;
        self.set_entry(alias, entry).await
    }

    /// Issue a PEM-encoded PKCS#10 CSR for the private key stored under
    /// `alias`.
    pub async fn generate_csr(
        &self,
        alias: &str,
        common_name: &str,
    ) -> Result<String, KeystoreError> {
        let entry = self
            .get_entry(alias)
            .await?
            .ok_or_else(|| KeystoreError::EntryNotFound(alias.to_string()))?;

        let KeystoreEntry::PrivateKey(key_entry) = entry else {
            return Err(KeystoreError::NotAPrivateKey(alias.to_string()));
        };

        signing::generate_csr(&key_entry.key_der, common_name)
    }

    /// The current verified CRL set; empty when CRL management is disabled.
    pub async fn get_crls(&self) -> Vec<StoredCrl> {
        match self.crl_manager.read().await.as_ref() {
            Some(manager) => manager.get_crls().await,
            None => Vec::new(),
        }
    }

    /// Revocation-store projection of the current verified CRLs.
    pub async fn crl_store(&self) -> RevocationStore {
        match self.crl_manager.read().await.as_ref() {
            Some(manager) => manager.cert_store().await,
            None => RevocationStore::default(),
        }
    }

    /// Store an externally supplied CRL. A no-op when CRL management is
    /// disabled.
    pub async fn add_crl(&self, der: &[u8]) -> Result<(), ServiceError> {
        if let Some(manager) = self.crl_manager.read().await.as_ref() {
            manager.store_crl(der).await?;
        }
        Ok(())
    }

    /// Run a CRL freshness check immediately instead of waiting for the
    /// next scheduled tick.
    pub async fn refresh_crls_now(&self) {
        if let Some(manager) = self.crl_manager.read().await.as_ref() {
            manager.refresh_now().await;
        }
    }

    /// Shut down CRL management. Entry operations remain available.
    pub async fn close(&self) {
        self.shutdown_crl_manager().await;
    }

    async fn try_add_to_crl_management(&self, entry: &KeystoreEntry) -> bool {
        let Some(cert) = entry.as_trusted_certificate() else {
            return false;
        };
        let guard = self.crl_manager.read().await;
        let Some(manager) = guard.as_ref() else {
            return false;
        };

        match manager.add_trusted_certificate(&cert.raw).await {
            Ok(changed) => changed,
            Err(e) => {
                warn!("Failed to add {} to CRL management: {}", cert.subject, e);
                false
            }
        }
    }

    async fn try_remove_from_crl_management(&self, entry: &KeystoreEntry) -> bool {
        let Some(cert) = entry.as_trusted_certificate() else {
            return false;
        };
        let guard = self.crl_manager.read().await;
        let Some(manager) = guard.as_ref() else {
            return false;
        };

        manager.remove_trusted_certificate(&cert.raw).await
    }

    fn post_changed_event(&self) {
        (self.change_listener)();
    }
}
