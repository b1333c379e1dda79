use thiserror::Error;
use x509_parser::prelude::X509Error;

/// CRL-related errors
#[derive(Error, Debug)]
pub enum CrlError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CRL parsing failed: {0}")]
    Parse(#[from] X509Error),

    #[error("invalid distribution point URI: {0}")]
    InvalidUri(#[from] url::ParseError),

    #[error("timeout while fetching CRL")]
    Timeout,

    #[error("CRL response too large: {0} bytes")]
    TooLarge(usize),

    #[error("failed to download a CRL from any of: {}", .0.join(", "))]
    AllDownloadsFailed(Vec<String>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persisted CRL store is not readable: {0}")]
    Persistence(#[from] serde_json::Error),

    #[error("CRL manager is closed")]
    Closed,

    #[error("{0}")]
    Custom(String),
}

/// Convenient Result type alias
pub type CrlResult<T> = Result<T, CrlError>;
