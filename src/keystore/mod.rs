//! Credential store abstraction: entry CRUD with password protection
//! semantics, key-pair generation and CSR issuance, plus the owner
//! component that feeds trusted certificates into CRL management.

pub mod entry;
pub mod memory;
pub mod service;
pub mod signing;

use thiserror::Error;
use x509_parser::prelude::X509Error;

pub use entry::{CertificateEntry, KeystoreEntry, PrivateKeyEntry, SecretKeyEntry};
pub use memory::MemoryKeystore;
pub use service::KeystoreService;

/// Error type for keystore operations.
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no entry for alias {0}")]
    EntryNotFound(String),

    #[error("entry {0} is password protected")]
    WrongPassword(String),

    #[error("entry {0} is not a private key")]
    NotAPrivateKey(String),

    #[error("X.509 error: {0}")]
    X509(#[from] X509Error),

    #[error("key generation failed: {0}")]
    KeyGeneration(#[from] rcgen::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<walkdir::Error> for KeystoreError {
    fn from(e: walkdir::Error) -> Self {
        KeystoreError::Io(e.into())
    }
}

/// Abstract interface for a credential store.
///
/// Password semantics: reading a private-key or secret-key entry requires
/// the store password; trusted certificate entries are returned without
/// protection. Writing always goes through the store's own password.
pub trait Keystore: Clone + Send + Sync + 'static {
    /// Get an entry by alias, supplying the password for protected entries.
    fn get_entry(
        &self,
        alias: &str,
        password: Option<&str>,
    ) -> impl Future<Output = Result<Option<KeystoreEntry>, KeystoreError>> + Send;

    /// Insert or replace an entry.
    fn set_entry(
        &self,
        alias: &str,
        entry: KeystoreEntry,
    ) -> impl Future<Output = Result<(), KeystoreError>> + Send;

    /// Remove an entry, returning it if it existed.
    fn delete_entry(
        &self,
        alias: &str,
    ) -> impl Future<Output = Result<Option<KeystoreEntry>, KeystoreError>> + Send;

    /// All aliases currently present.
    fn aliases(&self) -> impl Future<Output = Result<Vec<String>, KeystoreError>> + Send;

    /// All entries. Reserved for the owning component, which holds the
    /// store password by construction.
    fn entries(
        &self,
    ) -> impl Future<Output = Result<Vec<(String, KeystoreEntry)>, KeystoreError>> + Send;
}
