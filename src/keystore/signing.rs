use rcgen::{CertificateParams, DnType, KeyPair, SerialNumber};
use time::{Duration, OffsetDateTime};

use super::entry::{CertificateEntry, KeystoreEntry, PrivateKeyEntry};
use super::KeystoreError;

/// Generate an ECDSA P-256 key pair with a one-element self-signed
/// certificate chain for the given common name.
///
/// The certificate is valid for one year and uses the creation timestamp
/// (millis) as its serial number.
pub fn create_key_pair(common_name: &str) -> Result<KeystoreEntry, KeystoreError> {
    if common_name.trim().is_empty() {
        return Err(KeystoreError::InvalidArgument(
            "common name cannot be empty".to_string(),
        ));
    }

    let key = KeyPair::generate()?;

    let now = OffsetDateTime::now_utc();
    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params.serial_number = Some(SerialNumber::from(
        (now.unix_timestamp_nanos() / 1_000_000) as u64,
    ));
    params.not_before = now;
    params.not_after = now + Duration::days(365);

    let cert = params.self_signed(&key)?;

    Ok(KeystoreEntry::PrivateKey(PrivateKeyEntry {
        key_der: key.serialize_der(),
        chain: vec![CertificateEntry::from_der(cert.der())?],
    }))
}

/// Build a PEM-encoded PKCS#10 certificate signing request for an existing
/// private key.
pub fn generate_csr(key_der: &[u8], common_name: &str) -> Result<String, KeystoreError> {
    if common_name.trim().is_empty() {
        return Err(KeystoreError::InvalidArgument(
            "common name cannot be empty".to_string(),
        ));
    }

    let key = KeyPair::try_from(key_der)?;

    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);

    let csr = params.serialize_request(&key)?;
    Ok(csr.pem()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_chain_is_self_signed() {
        let entry = create_key_pair("device.example.com").unwrap();
        let KeystoreEntry::PrivateKey(key_entry) = entry else {
            panic!("expected a private key entry");
        };

        assert_eq!(key_entry.chain.len(), 1);
        let cert = &key_entry.chain[0];
        assert_eq!(cert.subject, cert.issuer);
        assert!(cert.subject.contains("device.example.com"));
    }

    #[test]
    fn csr_round_trips_through_the_stored_key() {
        let entry = create_key_pair("device.example.com").unwrap();
        let KeystoreEntry::PrivateKey(key_entry) = entry else {
            panic!("expected a private key entry");
        };

        let pem = generate_csr(&key_entry.key_der, "device.example.com").unwrap();
        assert!(pem.contains("BEGIN CERTIFICATE REQUEST"));
    }

    #[test]
    fn empty_common_name_is_rejected() {
        assert!(matches!(
            create_key_pair(" "),
            Err(KeystoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            generate_csr(&[], ""),
            Err(KeystoreError::InvalidArgument(_))
        ));
    }
}
