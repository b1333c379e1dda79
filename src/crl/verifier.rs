use tracing::{debug, warn};
use x509_parser::verify::verify_signature;

use super::types::{CandidateCrl, TrustedCertificate};

/// Decides whether a candidate CRL is signed by a trusted certificate.
///
/// When verification is administratively disabled, any syntactically valid
/// CRL is accepted. Errors while checking individual certificates are
/// swallowed: an unverifiable CRL is simply not trusted.
#[derive(Debug, Clone)]
pub struct CrlVerifier {
    verification_enabled: bool,
}

impl CrlVerifier {
    pub fn new(verification_enabled: bool) -> Self {
        Self {
            verification_enabled,
        }
    }

    /// Returns true iff at least one trusted certificate's public key
    /// validates the CRL signature (or verification is disabled).
    pub fn verify(&self, candidate: &CandidateCrl, trusted: &[TrustedCertificate]) -> bool {
        if !self.verification_enabled {
            debug!("CRL verification disabled, accepting CRL without signature check");
            return true;
        }

        let crl = match candidate.parse() {
            Ok(crl) => crl,
            Err(e) => {
                warn!("Candidate CRL does not parse: {}", e);
                return false;
            }
        };

        for entry in trusted {
            let cert = match entry.parse() {
                Ok(cert) => cert,
                Err(e) => {
                    warn!("Skipping unparseable trusted certificate {}: {}", entry.subject(), e);
                    continue;
                }
            };

            match verify_signature(
                &cert.tbs_certificate.subject_pki,
                &crl.signature_algorithm,
                &crl.signature_value,
                crl.tbs_cert_list.as_ref(),
            ) {
                Ok(()) => {
                    debug!("CRL signature verified against {}", entry.subject());
                    return true;
                }
                Err(_) => {
                    // Not signed by this certificate, try the next one
                }
            }
        }

        warn!("CRL signature did not verify against any trusted certificate");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{
        CertificateParams, CertificateRevocationListParams, Issuer, KeyIdMethod, KeyPair,
        SerialNumber,
    };
    use time::{Duration, OffsetDateTime};

    fn test_ca(cn: &str) -> (Issuer<'static, KeyPair>, TrustedCertificate) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, cn);
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).unwrap();
        let trusted = TrustedCertificate::from_der(cert.der()).unwrap();
        (Issuer::new(params, key), trusted)
    }

    fn empty_crl(issuer: &Issuer<'static, KeyPair>) -> CandidateCrl {
        let params = CertificateRevocationListParams {
            this_update: OffsetDateTime::now_utc(),
            next_update: OffsetDateTime::now_utc() + Duration::days(7),
            crl_number: SerialNumber::from(1u64),
            issuing_distribution_point: None,
            revoked_certs: Vec::new(),
            key_identifier_method: KeyIdMethod::Sha256,
        };
        let crl = params.signed_by(issuer).unwrap();
        CandidateCrl::from_der(crl.der().as_ref().to_vec(), "test://crl".to_string()).unwrap()
    }

    #[test]
    fn accepts_crl_signed_by_trusted_certificate() {
        let (issuer, trusted) = test_ca("Verifier CA");
        let candidate = empty_crl(&issuer);

        let verifier = CrlVerifier::new(true);
        assert!(verifier.verify(&candidate, &[trusted]));
    }

    #[test]
    fn rejects_crl_signed_by_unknown_key() {
        let (issuer, _) = test_ca("Signing CA");
        let (_, other_trusted) = test_ca("Unrelated CA");
        let candidate = empty_crl(&issuer);

        let verifier = CrlVerifier::new(true);
        assert!(!verifier.verify(&candidate, &[other_trusted]));
    }

    #[test]
    fn rejects_with_empty_trusted_set() {
        let (issuer, _) = test_ca("Signing CA");
        let candidate = empty_crl(&issuer);

        let verifier = CrlVerifier::new(true);
        assert!(!verifier.verify(&candidate, &[]));
    }

    #[test]
    fn disabled_verification_accepts_untrusted_signature() {
        let (issuer, _) = test_ca("Signing CA");
        let (_, other_trusted) = test_ca("Unrelated CA");
        let candidate = empty_crl(&issuer);

        let verifier = CrlVerifier::new(false);
        assert!(verifier.verify(&candidate, &[other_trusted]));
        assert!(verifier.verify(&candidate, &[]));
    }
}
