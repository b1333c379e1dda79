use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::config::CrlConfig;

use super::errors::{CrlError, CrlResult};
use super::fetcher::CrlFetcher;
use super::persistence::PersistedCrlStore;
use super::store::{CertificateStore, RevocationStore};
use super::types::{CandidateCrl, StoredCrl, TrustedCertificate};
use super::verifier::CrlVerifier;

/// The single change-notification subscriber slot. Invoked on a background
/// task, outside the manager state lock, after any refresh cycle that
/// changed at least one issuer's stored CRL.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

struct ManagerState {
    certificates: Vec<TrustedCertificate>,
    admin_uris: BTreeSet<BTreeSet<String>>,
    store: CertificateStore,
    projection: RevocationStore,
    listener: Option<ChangeListener>,
}

impl ManagerState {
    /// Every distribution point URI set currently watched: the
    /// administratively configured sets plus one set per trusted
    /// certificate that carries distribution points.
    fn watched_sets(&self) -> BTreeSet<BTreeSet<String>> {
        let mut sets = self.admin_uris.clone();
        for cert in &self.certificates {
            if !cert.distribution_points().is_empty() {
                sets.insert(cert.distribution_points().clone());
            }
        }
        sets
    }
}

/// The background refresh machinery shared with the scheduler task.
#[derive(Clone)]
struct Worker {
    state: Arc<Mutex<ManagerState>>,
    fetcher: CrlFetcher,
    verifier: CrlVerifier,
    persistence: PersistedCrlStore,
    closed: Arc<AtomicBool>,
}

impl Worker {
    /// One schedule tick: refresh every watched URI set that is due (all of
    /// them when `force` is set), then notify the listener once if anything
    /// changed.
    async fn run_cycle(&self, force: bool) {
        let (due, certificates) = {
            let state = self.state.lock().await;
            let now = OffsetDateTime::now_utc();

            let due: Vec<BTreeSet<String>> = state
                .watched_sets()
                .into_iter()
                .filter(|uris| {
                    force
                        || match state.store.find_by_uris(uris) {
                            Some(crl) => !crl.is_fresh(now),
                            None => true,
                        }
                })
                .collect();

            (due, state.certificates.clone())
        };

        if due.is_empty() {
            return;
        }
        debug!(
            "Refreshing {} distribution point sets (forced: {})",
            due.len(),
            force
        );

        // One fetch per URI set; a slow endpoint only delays its own set.
        let mut join_set = JoinSet::new();
        for uris in due {
            let fetcher = self.fetcher.clone();
            join_set.spawn(async move {
                let result = fetcher.fetch(&uris).await;
                (uris, result)
            });
        }

        let mut fetched = Vec::new();
        while let Some(task_result) = join_set.join_next().await {
            match task_result {
                Ok((uris, Ok(candidate))) => fetched.push((uris, candidate)),
                Ok((uris, Err(e))) => {
                    // Keep whatever was stored before; retried next tick.
                    warn!("CRL refresh failed, keeping previous data: {} ({:?})", e, uris);
                }
                Err(e) => error!("CRL fetch task failed to complete: {}", e),
            }
        }

        let mut verified = Vec::new();
        for (uris, candidate) in fetched {
            if !self.verifier.verify(&candidate, &certificates) {
                warn!(
                    "Discarding CRL fetched from {:?}: not signed by a trusted certificate",
                    uris
                );
                continue;
            }
            match StoredCrl::from_candidate(candidate, uris) {
                Ok(crl) => verified.push(crl),
                Err(e) => warn!("Verified CRL could not be promoted: {}", e),
            }
        }

        if verified.is_empty() {
            return;
        }

        let listener = {
            let mut state = self.state.lock().await;

            let mut changed = false;
            for crl in verified {
                if state.store.store_crl(crl) {
                    changed = true;
                }
            }
            if !changed {
                return;
            }

            state.projection = state.store.projection();
            self.persist(&state).await;
            state.listener.clone()
        };

        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if let Some(listener) = listener {
            // Fired outside the state lock so the callback may re-enter the
            // manager.
            listener();
        }
    }

    /// Persistence failures do not roll back the in-memory replacement.
    async fn persist(&self, state: &ManagerState) {
        if let Err(e) = self.persistence.save(state.store.as_map()).await {
            warn!(
                "Failed to persist CRL store to {:?}: {} (in-memory state kept)",
                self.persistence.path(),
                e
            );
        }
    }
}

/// Tracks the trusted certificates of interest, periodically downloads and
/// verifies the CRLs published at their distribution points, and keeps the
/// last known good CRL set in memory and on disk.
///
/// Two schedules drive refreshes for the lifetime of the manager: a short
/// freshness check (stored CRL absent or past its nextUpdate) and a long
/// forced update that re-fetches everything unconditionally. [`close`]
/// terminates both and cancels in-flight downloads.
///
/// [`close`]: CrlManager::close
pub struct CrlManager {
    worker: Worker,
    scheduler: JoinHandle<()>,
}

impl CrlManager {
    /// Create the manager and start its background schedules.
    ///
    /// Previously persisted CRLs are loaded from `store_path` and served
    /// immediately; a corrupt store file is logged and replaced on the next
    /// successful refresh. Returns an error only if the HTTP client cannot
    /// be initialized.
    pub async fn new(options: &CrlConfig, store_path: impl Into<PathBuf>) -> CrlResult<Self> {
        let fetcher = CrlFetcher::new(options.fetch_timeout())?;
        let verifier = CrlVerifier::new(options.verification_enabled);
        let persistence = PersistedCrlStore::new(store_path);

        let loaded = match persistence.load().await {
            Ok(crls) => crls,
            Err(e) => {
                warn!(
                    "Failed to load persisted CRL store from {:?}: {}, starting empty",
                    persistence.path(),
                    e
                );
                Default::default()
            }
        };

        let store = CertificateStore::new(loaded);
        let projection = store.projection();

        let worker = Worker {
            state: Arc::new(Mutex::new(ManagerState {
                certificates: Vec::new(),
                admin_uris: BTreeSet::new(),
                store,
                projection,
                listener: None,
            })),
            fetcher,
            verifier,
            persistence,
            closed: Arc::new(AtomicBool::new(false)),
        };

        let scheduler = {
            let worker = worker.clone();
            let check_period = options.check_interval();
            let update_period = options.update_interval();

            tokio::spawn(async move {
                let mut check = interval(check_period);
                check.set_missed_tick_behavior(MissedTickBehavior::Delay);
                let mut forced = interval(update_period);
                forced.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // An interval fires immediately; the first check tick doubles
                // as the startup refresh, the first forced tick is redundant.
                forced.tick().await;

                loop {
                    tokio::select! {
                        _ = check.tick() => worker.run_cycle(false).await,
                        _ = forced.tick() => worker.run_cycle(true).await,
                    }
                }
            })
        };

        info!(
            "CRL manager started (check every {:?}, forced update every {:?})",
            options.check_interval(),
            options.update_interval()
        );

        Ok(Self { worker, scheduler })
    }

    /// Watch an administratively configured distribution point URI set,
    /// independent of any certificate.
    pub async fn add_distribution_point(&self, uris: BTreeSet<String>) {
        if self.is_closed() || uris.is_empty() {
            return;
        }
        self.worker.state.lock().await.admin_uris.insert(uris);
    }

    /// Register a certificate as trusted and watch its distribution points.
    ///
    /// Returns whether the watched distribution point set changed; a
    /// duplicate registration or a certificate without distribution points
    /// leaves it untouched.
    pub async fn add_trusted_certificate(&self, der: &[u8]) -> CrlResult<bool> {
        if self.is_closed() {
            return Ok(false);
        }
        let cert = TrustedCertificate::from_der(der)?;

        let mut state = self.worker.state.lock().await;
        if state.certificates.contains(&cert) {
            return Ok(false);
        }

        let before = state.watched_sets();
        debug!(
            "Adding trusted certificate {} with {} distribution points",
            cert.subject(),
            cert.distribution_points().len()
        );
        state.certificates.push(cert);
        Ok(state.watched_sets() != before)
    }

    /// Unregister a trusted certificate.
    ///
    /// Its distribution points stop being watched unless another trusted
    /// certificate or an administrative entry shares them, and CRLs fetched
    /// from the dropped set are pruned. Returns whether the watched set
    /// changed.
    pub async fn remove_trusted_certificate(&self, der: &[u8]) -> bool {
        if self.is_closed() {
            return false;
        }

        let mut state = self.worker.state.lock().await;
        let Some(position) = state.certificates.iter().position(|c| c.raw() == der) else {
            return false;
        };

        let before = state.watched_sets();
        let removed = state.certificates.remove(position);
        let after = state.watched_sets();
        if after == before {
            return false;
        }

        debug!("Removed trusted certificate {}", removed.subject());
        if state.store.prune_by_uris(removed.distribution_points()) {
            state.projection = state.store.projection();
            self.worker.persist(&state).await;
        }
        true
    }

    /// Read-only snapshot of the current verified CRL set.
    pub async fn get_crls(&self) -> Vec<StoredCrl> {
        self.worker.state.lock().await.store.crls().cloned().collect()
    }

    /// The revocation-store projection of the current verified CRLs.
    pub async fn cert_store(&self) -> RevocationStore {
        self.worker.state.lock().await.projection.clone()
    }

    /// Replace the change-notification subscriber; `None` unsubscribes.
    pub async fn set_listener(&self, listener: Option<ChangeListener>) {
        self.worker.state.lock().await.listener = listener;
    }

    /// Store an externally supplied CRL directly, bypassing fetch and
    /// verification. It is persisted but not associated with any watched
    /// distribution point, so scheduled refreshes never replace it on their
    /// own freshness checks.
    pub async fn store_crl(&self, der: &[u8]) -> CrlResult<()> {
        if self.is_closed() {
            return Err(CrlError::Closed);
        }
        let candidate = CandidateCrl::from_der(der.to_vec(), String::new())?;
        let crl = StoredCrl::from_candidate(candidate, BTreeSet::new())?;

        let mut state = self.worker.state.lock().await;
        if state.store.store_crl(crl) {
            state.projection = state.store.projection();
            self.worker.persist(&state).await;
        }
        Ok(())
    }

    /// Run one freshness check cycle immediately, without waiting for the
    /// next scheduled tick.
    pub async fn refresh_now(&self) {
        if self.is_closed() {
            return;
        }
        self.worker.run_cycle(false).await;
    }

    pub fn is_closed(&self) -> bool {
        self.worker.closed.load(Ordering::SeqCst)
    }

    /// Terminate the background schedules and cancel in-flight downloads.
    ///
    /// Idempotent; after `close` no further listener notifications fire and
    /// mutating calls are no-ops. The manager cannot be restarted.
    pub fn close(&self) {
        if !self.worker.closed.swap(true, Ordering::SeqCst) {
            info!("Closing CRL manager");
            // Dropping the scheduler also drops its JoinSet, aborting any
            // in-flight fetch tasks.
            self.scheduler.abort();
        }
    }
}

impl Drop for CrlManager {
    fn drop(&mut self) {
        self.close();
    }
}
