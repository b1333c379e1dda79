//! Certificate Revocation List (CRL) management
//!
//! # Features
//! - Distribution point extraction from trusted certificates
//! - CRL fetching from distribution points, first success wins
//! - Signature verification against the trusted certificate set
//! - Issuer-keyed revocation store with file persistence
//! - Two periodic schedules (freshness check and forced update) with
//!   batched change notification

mod errors;
mod fetcher;
mod manager;
mod parser;
mod persistence;
mod store;
mod types;
mod verifier;

// Re-export public types
pub use errors::{CrlError, CrlResult};
pub use fetcher::CrlFetcher;
pub use manager::{ChangeListener, CrlManager};
pub use parser::{extract_distribution_points, is_watchable_uri};
pub use persistence::PersistedCrlStore;
pub use store::{CertificateStore, RevocationStore};
pub use types::{CandidateCrl, RevocationInfo, RevocationReason, StoredCrl, TrustedCertificate};
pub use verifier::CrlVerifier;
