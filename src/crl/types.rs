use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
// The x509-parser prelude re-exports its own `time` module; the crate path
// must be explicit here.
use ::time::OffsetDateTime;
use tracing::{debug, warn};
use x509_parser::prelude::*;

use super::errors::{CrlError, CrlResult};
use super::parser::extract_distribution_points;

/// An X.509 certificate the owner has decided to trust.
///
/// Identified by its DER bytes; the distribution point URIs are extracted
/// once on construction and never recomputed.
#[derive(Debug, Clone)]
pub struct TrustedCertificate {
    raw: Vec<u8>,
    subject: String,
    issuer: String,
    distribution_points: BTreeSet<String>,
}

impl TrustedCertificate {
    pub fn from_der(der: impl AsRef<[u8]>) -> CrlResult<Self> {
        let der = der.as_ref();
        let (_, cert) = X509Certificate::from_der(der).map_err(|e| CrlError::Parse(e.into()))?;

        Ok(Self {
            raw: der.to_vec(),
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            distribution_points: extract_distribution_points(&cert),
        })
    }

    /// Parse the certificate from the stored DER bytes
    pub fn parse(&self) -> CrlResult<X509Certificate<'_>> {
        let (_, cert) =
            X509Certificate::from_der(&self.raw).map_err(|e| CrlError::Parse(e.into()))?;
        Ok(cert)
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn distribution_points(&self) -> &BTreeSet<String> {
        &self.distribution_points
    }
}

impl PartialEq for TrustedCertificate {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for TrustedCertificate {}

/// A freshly fetched, not yet verified revocation list.
///
/// Transient: either promoted to a [`StoredCrl`] after signature
/// verification or discarded.
#[derive(Debug, Clone)]
pub struct CandidateCrl {
    der: Vec<u8>,
    source_uri: String,
}

impl CandidateCrl {
    /// Create a candidate from DER data, validating that it parses as a CRL.
    pub fn from_der(der: Vec<u8>, source_uri: String) -> CrlResult<Self> {
        let _ = CertificateRevocationList::from_der(&der).map_err(|e| CrlError::Parse(e.into()))?;
        Ok(Self { der, source_uri })
    }

    pub fn parse(&self) -> CrlResult<CertificateRevocationList<'_>> {
        let (_, crl) =
            CertificateRevocationList::from_der(&self.der).map_err(|e| CrlError::Parse(e.into()))?;
        Ok(crl)
    }

    pub fn issuer(&self) -> CrlResult<String> {
        Ok(self.parse()?.tbs_cert_list.issuer.to_string())
    }

    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    pub fn into_der(self) -> Vec<u8> {
        self.der
    }
}

/// A verified CRL together with the distribution point URIs it was fetched
/// from, as kept in memory and in the persisted store.
///
/// At most one `StoredCrl` is retained per distinct issuer; replacement is
/// atomic (old discarded, new written). The DER blob is authoritative,
/// timestamps are re-parsed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCrl {
    pub issuer: String,
    pub uris: BTreeSet<String>,
    pub der: Vec<u8>,
}

impl StoredCrl {
    /// Promote a verified candidate, associating it with the URI set it was
    /// fetched for.
    pub fn from_candidate(candidate: CandidateCrl, uris: BTreeSet<String>) -> CrlResult<Self> {
        let issuer = candidate.issuer()?;
        Ok(Self {
            issuer,
            uris,
            der: candidate.into_der(),
        })
    }

    pub fn parse(&self) -> CrlResult<CertificateRevocationList<'_>> {
        let (_, crl) =
            CertificateRevocationList::from_der(&self.der).map_err(|e| CrlError::Parse(e.into()))?;
        Ok(crl)
    }

    pub fn next_update(&self) -> Option<OffsetDateTime> {
        let crl = self.parse().ok()?;
        crl.tbs_cert_list.next_update.map(|t| t.to_datetime())
    }

    /// Whether this CRL still needs no refresh at `now`.
    ///
    /// A missing or unparseable nextUpdate field counts as stale, so the
    /// next check cycle fetches a fresh copy.
    pub fn is_fresh(&self, now: OffsetDateTime) -> bool {
        match self.next_update() {
            Some(next_update) => now <= next_update,
            None => false,
        }
    }

    /// Look up a serial number in this CRL.
    pub fn revocation_info(&self, serial: &[u8]) -> Option<RevocationInfo> {
        let crl = match self.parse() {
            Ok(crl) => crl,
            Err(e) => {
                warn!("Failed to parse stored CRL for {}: {}", self.issuer, e);
                return None;
            }
        };

        for revoked in &crl.tbs_cert_list.revoked_certificates {
            if revoked.user_certificate.to_bytes_be() == serial {
                debug!(
                    "Serial {} is revoked by {}",
                    hex::encode_upper(serial),
                    self.issuer
                );
                return Some(RevocationInfo {
                    serial: serial.to_vec(),
                    revocation_date: revoked.revocation_date.to_datetime(),
                    reason: extract_reason(revoked),
                });
            }
        }
        None
    }
}

/// Extract the optional reason-code extension of a revoked certificate
/// entry.
fn extract_reason(revoked: &RevokedCertificate) -> Option<RevocationReason> {
    revoked
        .reason_code()
        .and_then(|(_, code)| RevocationReason::from_u8(code.0))
}

/// Details of a revoked serial number found in a verified CRL.
#[derive(Debug, Clone, PartialEq)]
pub struct RevocationInfo {
    pub serial: Vec<u8>,
    pub revocation_date: OffsetDateTime,
    pub reason: Option<RevocationReason>,
}

/// CRL reason codes per RFC 5280 §5.3.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    RemoveFromCrl,
    PrivilegeWithdrawn,
    AaCompromise,
}

impl RevocationReason {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unspecified),
            1 => Some(Self::KeyCompromise),
            2 => Some(Self::CaCompromise),
            3 => Some(Self::AffiliationChanged),
            4 => Some(Self::Superseded),
            5 => Some(Self::CessationOfOperation),
            6 => Some(Self::CertificateHold),
            8 => Some(Self::RemoveFromCrl),
            9 => Some(Self::PrivilegeWithdrawn),
            10 => Some(Self::AaCompromise),
            _ => None,
        }
    }
}
