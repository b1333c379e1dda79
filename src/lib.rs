//! Keystore and certificate-lifecycle services.
//!
//! The crate is built around two pieces:
//!
//! - [`keystore`]: a credential store abstraction (trusted certificates, key
//!   pairs, secret keys) with entry CRUD, key-pair generation and PKCS#10
//!   CSR issuance.
//! - [`crl`]: autonomous Certificate Revocation List management. The
//!   [`crl::CrlManager`] watches the distribution points embedded in trusted
//!   certificates, periodically downloads and verifies CRLs, merges them
//!   into a queryable revocation store and notifies a listener when the
//!   trust state changes.
//!
//! [`keystore::KeystoreService`] wires the two together the way a TLS stack
//! owner consumes them.

pub mod config;
pub mod crl;
pub mod keystore;
pub mod telemetry;
