use std::sync::Arc;

use x509_parser::prelude::*;

use super::KeystoreError;

/// Represents a certificate with additional metadata.
#[derive(Debug, Clone)]
pub struct CertificateEntry {
    pub raw: Arc<Vec<u8>>,
    pub serial_number: String,
    pub subject: String,
    pub issuer: String,
}

impl CertificateEntry {
    /// Create a certificate entry from DER-encoded bytes
    pub fn from_der(der: impl AsRef<[u8]>) -> Result<Self, KeystoreError> {
        let der_bytes = der.as_ref();
        let (_, cert) =
            X509Certificate::from_der(der_bytes).map_err(|e| KeystoreError::X509(e.into()))?;

        let serial_number = cert.tbs_certificate.serial.to_string();
        let subject = cert.subject().to_string();
        let issuer = cert.issuer().to_string();

        Ok(Self {
            raw: Arc::new(der_bytes.to_vec()),
            serial_number,
            subject,
            issuer,
        })
    }

    /// Parse the certificate from stored DER bytes
    pub fn parse(&self) -> Result<X509Certificate<'_>, KeystoreError> {
        let (_, cert) =
            X509Certificate::from_der(&self.raw).map_err(|e| KeystoreError::X509(e.into()))?;
        Ok(cert)
    }
}

/// A private key (PKCS#8 DER) with its certificate chain, leaf first.
#[derive(Debug, Clone)]
pub struct PrivateKeyEntry {
    pub key_der: Vec<u8>,
    pub chain: Vec<CertificateEntry>,
}

/// An opaque symmetric key.
#[derive(Debug, Clone)]
pub struct SecretKeyEntry {
    pub bytes: Vec<u8>,
}

/// A keystore entry.
///
/// Trusted certificate entries are public material and carry no password
/// protection; private-key and secret-key entries are released only against
/// the store password.
#[derive(Debug, Clone)]
pub enum KeystoreEntry {
    TrustedCertificate(CertificateEntry),
    PrivateKey(PrivateKeyEntry),
    SecretKey(SecretKeyEntry),
}

impl KeystoreEntry {
    pub fn is_password_protected(&self) -> bool {
        !matches!(self, KeystoreEntry::TrustedCertificate(_))
    }

    /// The trusted certificate carried by this entry, if it is one.
    pub fn as_trusted_certificate(&self) -> Option<&CertificateEntry> {
        match self {
            KeystoreEntry::TrustedCertificate(cert) => Some(cert),
            _ => None,
        }
    }
}
