use std::collections::BTreeSet;
use std::time::Duration;

use reqwest::Client;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use super::errors::{CrlError, CrlResult};
use super::types::CandidateCrl;

/// Maximum accepted CRL size (10 MB)
const MAX_CRL_SIZE: usize = 10 * 1024 * 1024;

/// Downloads candidate CRLs from distribution point URIs.
///
/// A fetch iterates its URI set in lexicographic order and completes with
/// the first successfully downloaded and parsed CRL. Cancellation happens
/// by aborting the task driving the future; an aborted fetch never
/// produces an outcome.
#[derive(Debug, Clone)]
pub struct CrlFetcher {
    client: Client,
    request_timeout: Duration,
}

impl CrlFetcher {
    /// Returns an error if the HTTP client cannot be initialized
    pub fn new(request_timeout: Duration) -> CrlResult<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            request_timeout,
        })
    }

    /// Try each URI in order; first parse success wins.
    ///
    /// Individual failures are logged and the next URI is tried. When the
    /// set is exhausted the fetch fails with the full list of attempted
    /// URIs.
    pub async fn fetch(&self, uris: &BTreeSet<String>) -> CrlResult<CandidateCrl> {
        for uri in uris {
            match self.fetch_one(uri).await {
                Ok(candidate) => {
                    info!("Successfully fetched CRL from {}", uri);
                    return Ok(candidate);
                }
                Err(e) => {
                    warn!("Failed to fetch CRL from {}: {}", uri, e);
                }
            }
        }

        Err(CrlError::AllDownloadsFailed(uris.iter().cloned().collect()))
    }

    /// Fetch and parse a single distribution point with timeout.
    async fn fetch_one(&self, uri: &str) -> CrlResult<CandidateCrl> {
        debug!("Fetching CRL from: {}", uri);

        let _ = Url::parse(uri)?;

        let response = match timeout(self.request_timeout, self.client.get(uri).send()).await {
            Ok(result) => result?,
            Err(_) => return Err(CrlError::Timeout),
        };

        if !response.status().is_success() {
            return Err(CrlError::Custom(format!(
                "HTTP error {}: failed to fetch CRL from {}",
                response.status(),
                uri
            )));
        }

        if let Some(len) = response.content_length()
            && len as usize > MAX_CRL_SIZE
        {
            return Err(CrlError::TooLarge(len as usize));
        }

        let body = response.bytes().await?.to_vec();
        if body.len() > MAX_CRL_SIZE {
            return Err(CrlError::TooLarge(body.len()));
        }

        CandidateCrl::from_der(body, uri.to_string())
    }
}
