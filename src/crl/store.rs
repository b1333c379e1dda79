use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use super::types::{RevocationInfo, StoredCrl};

/// The mutable set of verified CRLs, keyed by issuer distinguished name.
///
/// Owned by the CRL manager and mutated only under its state lock. At most
/// one CRL is retained per issuer; a newer verified CRL for the same issuer
/// atomically replaces the older one.
#[derive(Debug, Clone, Default)]
pub struct CertificateStore {
    crls: HashMap<String, StoredCrl>,
}

impl CertificateStore {
    pub fn new(crls: HashMap<String, StoredCrl>) -> Self {
        Self { crls }
    }

    /// Insert or replace the CRL for its issuer.
    ///
    /// Returns whether the stored set actually changed (a byte-identical
    /// replacement is not a change).
    pub fn store_crl(&mut self, crl: StoredCrl) -> bool {
        match self.crls.get(&crl.issuer) {
            Some(existing) if *existing == crl => false,
            _ => {
                debug!("Storing CRL for issuer {}", crl.issuer);
                self.crls.insert(crl.issuer.clone(), crl);
                true
            }
        }
    }

    /// Drop every CRL associated with the given URI set.
    ///
    /// Used when a trusted certificate is removed and no other source
    /// watches the same distribution points. Returns whether anything was
    /// removed.
    pub fn prune_by_uris(&mut self, uris: &BTreeSet<String>) -> bool {
        let before = self.crls.len();
        self.crls.retain(|_, crl| crl.uris != *uris);
        before != self.crls.len()
    }

    /// The CRL currently associated with the given URI set, if any.
    pub fn find_by_uris(&self, uris: &BTreeSet<String>) -> Option<&StoredCrl> {
        self.crls.values().find(|crl| crl.uris == *uris)
    }

    pub fn get(&self, issuer: &str) -> Option<&StoredCrl> {
        self.crls.get(issuer)
    }

    pub fn crls(&self) -> impl Iterator<Item = &StoredCrl> {
        self.crls.values()
    }

    pub fn as_map(&self) -> &HashMap<String, StoredCrl> {
        &self.crls
    }

    pub fn len(&self) -> usize {
        self.crls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crls.is_empty()
    }

    /// Build the read-only projection handed out to revocation checkers.
    pub fn projection(&self) -> RevocationStore {
        RevocationStore {
            crls: Arc::new(self.crls.values().cloned().collect()),
        }
    }
}

/// A read-only snapshot of the verified CRL set, suitable for revocation
/// checks. Rebuilt by the manager whenever the stored set changes; never
/// mutated in place.
#[derive(Debug, Clone, Default)]
pub struct RevocationStore {
    crls: Arc<Vec<StoredCrl>>,
}

impl RevocationStore {
    pub fn crls(&self) -> &[StoredCrl] {
        &self.crls
    }

    pub fn is_empty(&self) -> bool {
        self.crls.is_empty()
    }

    /// Is the given serial revoked by a verified CRL of the given issuer?
    pub fn is_revoked(&self, issuer: &str, serial: &[u8]) -> bool {
        self.revocation_info(issuer, serial).is_some()
    }

    pub fn revocation_info(&self, issuer: &str, serial: &[u8]) -> Option<RevocationInfo> {
        self.crls
            .iter()
            .filter(|crl| crl.issuer == issuer)
            .find_map(|crl| crl.revocation_info(serial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{
        CertificateParams, CertificateRevocationListParams, Issuer, KeyIdMethod, KeyPair,
        RevokedCertParams, SerialNumber,
    };
    use time::{Duration, OffsetDateTime};
    use x509_parser::prelude::FromDer;

    fn stored_crl(cn: &str, uri: &str, revoked_serial: Option<&[u8]>) -> StoredCrl {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, cn);
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).unwrap();
        let issuer_dn = {
            let (_, parsed) =
                x509_parser::prelude::X509Certificate::from_der(cert.der()).unwrap();
            parsed.subject().to_string()
        };
        let issuer = Issuer::new(params, key);

        let crl_params = CertificateRevocationListParams {
            this_update: OffsetDateTime::now_utc(),
            next_update: OffsetDateTime::now_utc() + Duration::days(7),
            crl_number: SerialNumber::from(1u64),
            issuing_distribution_point: None,
            revoked_certs: revoked_serial
                .map(|serial| {
                    vec![RevokedCertParams {
                        serial_number: SerialNumber::from(serial.to_vec()),
                        revocation_time: OffsetDateTime::now_utc(),
                        reason_code: Some(rcgen::RevocationReason::KeyCompromise),
                        invalidity_date: None,
                    }]
                })
                .unwrap_or_default(),
            key_identifier_method: KeyIdMethod::Sha256,
        };
        let crl = crl_params.signed_by(&issuer).unwrap();

        StoredCrl {
            issuer: issuer_dn,
            uris: BTreeSet::from([uri.to_string()]),
            der: crl.der().as_ref().to_vec(),
        }
    }

    #[test]
    fn replaces_crl_per_issuer() {
        let mut store = CertificateStore::default();
        let first = stored_crl("Store CA", "http://crl.example.com/a.crl", None);
        let mut second = first.clone();
        second.der.push(0);

        assert!(store.store_crl(first.clone()));
        assert!(!store.store_crl(first));
        assert!(store.store_crl(second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn prunes_by_uri_set() {
        let mut store = CertificateStore::default();
        let crl = stored_crl("Pruned CA", "http://crl.example.com/a.crl", None);
        let uris = crl.uris.clone();
        store.store_crl(crl);

        assert!(store.prune_by_uris(&uris));
        assert!(store.is_empty());
        assert!(!store.prune_by_uris(&uris));
    }

    #[test]
    fn projection_answers_revocation_queries() {
        let serial = [0x42u8, 0x13, 0x37];
        let mut store = CertificateStore::default();
        let crl = stored_crl("Revoking CA", "http://crl.example.com/a.crl", Some(&serial));
        let issuer = crl.issuer.clone();
        store.store_crl(crl);

        let projection = store.projection();
        assert!(projection.is_revoked(&issuer, &serial));
        assert!(!projection.is_revoked(&issuer, &[0x01]));
        assert!(!projection.is_revoked("CN=Other CA", &serial));

        let info = projection.revocation_info(&issuer, &serial).unwrap();
        assert_eq!(
            info.reason,
            Some(crate::crl::types::RevocationReason::KeyCompromise)
        );
    }
}
