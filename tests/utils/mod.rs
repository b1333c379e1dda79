#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::any;
use rcgen::{
    BasicConstraints, CertificateParams, CertificateRevocationListParams, CrlDistributionPoint,
    DnType, IsCa, Issuer, KeyIdMethod, KeyPair, RevokedCertParams, SerialNumber,
};
use time::{Duration, OffsetDateTime};
use x509_parser::prelude::{FromDer, X509Certificate};

/// A self-signed CA that can issue CRLs and leaf certificates.
pub struct TestCa {
    issuer: Issuer<'static, KeyPair>,
    cert_der: Vec<u8>,
    issuer_dn: String,
}

impl TestCa {
    /// Create a CA; `crl_uris` become the CRLDistributionPoints extension
    /// of the CA certificate itself.
    pub fn new(common_name: &str, crl_uris: &[&str]) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        if !crl_uris.is_empty() {
            params.crl_distribution_points = vec![CrlDistributionPoint {
                uris: crl_uris.iter().map(|uri| uri.to_string()).collect(),
            }];
        }

        let cert = params.self_signed(&key).unwrap();
        let cert_der = cert.der().to_vec();
        let issuer_dn = {
            let (_, parsed) = X509Certificate::from_der(&cert_der).unwrap();
            parsed.subject().to_string()
        };

        Self {
            issuer: Issuer::new(params, key),
            cert_der,
            issuer_dn,
        }
    }

    pub fn cert_der(&self) -> &[u8] {
        &self.cert_der
    }

    pub fn issuer_dn(&self) -> &str {
        &self.issuer_dn
    }

    /// Sign a CRL revoking the given serial numbers, valid until
    /// `valid_for` from now.
    pub fn crl_der(&self, revoked_serials: &[&[u8]], valid_for: Duration) -> Vec<u8> {
        let params = CertificateRevocationListParams {
            this_update: OffsetDateTime::now_utc(),
            next_update: OffsetDateTime::now_utc() + valid_for,
            crl_number: SerialNumber::from(1u64),
            issuing_distribution_point: None,
            revoked_certs: revoked_serials
                .iter()
                .map(|serial| RevokedCertParams {
                    serial_number: SerialNumber::from(serial.to_vec()),
                    revocation_time: OffsetDateTime::now_utc(),
                    reason_code: Some(rcgen::RevocationReason::KeyCompromise),
                    invalidity_date: None,
                })
                .collect(),
            key_identifier_method: KeyIdMethod::Sha256,
        };

        params.signed_by(&self.issuer).unwrap().der().as_ref().to_vec()
    }
}

#[derive(Default)]
struct ServerState {
    crls: Mutex<HashMap<String, Vec<u8>>>,
    hits: Mutex<Vec<String>>,
}

/// An HTTP server acting as a set of CRL distribution points.
#[derive(Clone)]
pub struct DistributionPointServer {
    state: Arc<ServerState>,
    base_url: String,
}

impl DistributionPointServer {
    pub async fn spawn() -> Self {
        credstore::telemetry::init_tracing();

        let state = Arc::new(ServerState::default());
        let app = Router::new()
            .fallback(any(serve_crl))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { state, base_url }
    }

    /// Absolute URL for a path on this server.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Serve `der` at `path`.
    pub fn set_crl(&self, path: &str, der: Vec<u8>) {
        self.state
            .crls
            .lock()
            .unwrap()
            .insert(path.to_string(), der);
    }

    /// Stop serving `path`; requests return 404.
    pub fn remove_crl(&self, path: &str) {
        self.state.crls.lock().unwrap().remove(path);
    }

    /// Paths requested so far, in order.
    pub fn hits(&self) -> Vec<String> {
        self.state.hits.lock().unwrap().clone()
    }
}

async fn serve_crl(State(state): State<Arc<ServerState>>, uri: Uri) -> impl IntoResponse {
    let path = uri.path().to_string();
    state.hits.lock().unwrap().push(path.clone());

    match state.crls.lock().unwrap().get(&path) {
        Some(der) => (StatusCode::OK, der.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
