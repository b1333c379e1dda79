use std::collections::BTreeSet;

use tracing::{debug, warn};
use url::Url;
use x509_parser::oid_registry;
use x509_parser::prelude::*;

/// Extract CRL distribution point URIs from a certificate.
///
/// Only "full name" addressing forms carrying a URI general name are
/// considered. Returns the empty set if the extension is absent, uses no
/// URI general names, or is malformed; a corrupt certificate never fails
/// this call.
pub fn extract_distribution_points(cert: &X509Certificate) -> BTreeSet<String> {
    let mut uris = BTreeSet::new();

    for ext in cert.tbs_certificate.extensions() {
        if ext.oid != oid_registry::OID_X509_EXT_CRL_DISTRIBUTION_POINTS {
            continue;
        }

        match ext.parsed_extension() {
            ParsedExtension::CRLDistributionPoints(points) => {
                for point in &points.points {
                    let Some(DistributionPointName::FullName(names)) = &point.distribution_point
                    else {
                        continue;
                    };

                    for name in names {
                        if let GeneralName::URI(uri) = name {
                            if is_watchable_uri(uri) {
                                uris.insert((*uri).to_string());
                            } else {
                                warn!("Skipping unparseable distribution point URI: {}", uri);
                            }
                        }
                    }
                }
            }
            other => {
                warn!(
                    "CRLDistributionPoints extension did not parse ({:?}), ignoring",
                    other
                );
            }
        }
    }

    if uris.is_empty() {
        debug!("No CRL distribution points found in certificate extensions");
    } else {
        debug!("Found {} CRL distribution points", uris.len());
    }

    uris
}

/// A URI is watchable when it parses as an absolute URL. Scheme support is
/// the fetcher's concern; an unsupported scheme simply fails the download
/// attempt at fetch time.
pub fn is_watchable_uri(uri: &str) -> bool {
    Url::parse(uri).is_ok()
}
