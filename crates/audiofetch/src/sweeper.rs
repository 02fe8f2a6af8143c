//! Periodic cleanup of expired and orphaned artifacts.
//!
//! Each pass reconciles the cache records, the downloads directory and the
//! history ledger: stale records and records whose file is gone are purged,
//! then any artifact file older than the TTL that no live record references
//! is deleted.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::cache::{CacheEntry, CacheStore};
use crate::cleanup::{purge_artifact, PurgeReport};
use crate::db::DatabaseError;
use crate::history::HistoryLedger;
use crate::storage::ArtifactName;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Cache records looked at.
    pub examined: usize,
    /// Records purged because they had been idle longer than the TTL.
    pub expired: usize,
    /// Records purged because their artifact file was gone.
    pub missing_artifact: usize,
    /// Unreferenced artifact files deleted.
    pub orphans_removed: usize,
    pub files_removed: usize,
    pub history_removed: usize,
    /// Expired store rows dropped at the end of the pass.
    pub rows_purged: usize,
    /// Items that could not be cleaned up; they are retried next pass.
    pub errors: usize,
}

impl SweepReport {
    fn absorb(&mut self, purge: &PurgeReport) {
        if purge.file_removed {
            self.files_removed += 1;
        }
        self.history_removed += purge.history_removed;
    }

    pub fn removed_anything(&self) -> bool {
        self.expired + self.missing_artifact + self.orphans_removed + self.rows_purged > 0
    }
}

/// Background sweeper. Runs one pass after a startup delay, then on every
/// interval tick or manual trigger.
#[derive(Clone)]
pub struct ExpirySweeper {
    cache: CacheStore,
    history: HistoryLedger,
    interval: Duration,
    startup_delay: Duration,
    shutdown: Arc<AtomicBool>,
}

impl ExpirySweeper {
    pub fn new(
        cache: CacheStore,
        history: HistoryLedger,
        interval: Duration,
        startup_delay: Duration,
    ) -> Self {
        Self {
            cache,
            history,
            interval,
            startup_delay,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs one full pass. Failures on individual items are logged and
    /// counted, never propagated.
    pub fn sweep_once(&self) -> SweepReport {
        let _span = tracing::info_span!("sweep").entered();
        let mut report = SweepReport::default();
        let ttl = self.cache.ttl();
        let now = Utc::now();

        let entries = match self.cache.entries() {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("Sweep could not read cache records: {}", e);
                report.errors += 1;
                Vec::new()
            }
        };

        let mut live: HashSet<ArtifactName> = HashSet::new();
        for entry in entries {
            report.examined += 1;
            let artifact = entry.artifact();
            let stale = entry.is_stale(now, ttl);
            let missing = !self.cache.storage().exists(&artifact);

            if !stale && !missing {
                live.insert(artifact);
                continue;
            }

            // The snapshot may predate a cache hit; decide on the current record.
            if stale && !missing {
                match self.confirm_stale(&entry, ttl) {
                    Ok(true) => {}
                    Ok(false) => {
                        live.insert(artifact);
                        continue;
                    }
                    Err(e) => {
                        log::error!("Sweep could not re-read {}: {}", artifact, e);
                        report.errors += 1;
                        continue;
                    }
                }
            }

            if stale {
                report.expired += 1;
            } else {
                report.missing_artifact += 1;
            }

            match purge_artifact(&self.cache, &self.history, &artifact) {
                Ok(purge) => report.absorb(&purge),
                Err(e) => {
                    log::error!("Failed to purge {}: {}", artifact, e);
                    report.errors += 1;
                }
            }
        }

        self.remove_orphans(&live, ttl, &mut report);

        match self.cache.purge_expired() {
            Ok(count) => report.rows_purged = count,
            Err(e) => {
                log::error!("Failed to purge expired store rows: {}", e);
                report.errors += 1;
            }
        }

        if report.removed_anything() || report.errors > 0 {
            log::info!(
                "Sweep: {} expired, {} missing, {} orphans, {} files deleted, {} errors",
                report.expired,
                report.missing_artifact,
                report.orphans_removed,
                report.files_removed,
                report.errors
            );
        } else {
            log::debug!("Sweep: nothing to remove ({} records)", report.examined);
        }
        report
    }

    /// Re-reads the record behind `snapshot`. A record that was touched
    /// since the snapshot, or that is already gone, is not purged.
    fn confirm_stale(&self, snapshot: &CacheEntry, ttl: Duration) -> Result<bool, DatabaseError> {
        let current = self.cache.peek(&snapshot.identifier, snapshot.format)?;
        Ok(current.is_some_and(|entry| entry.is_stale(Utc::now(), ttl)))
    }

    /// Deletes files no live record references. Files younger than the TTL
    /// are left alone, which also protects artifacts of running jobs.
    fn remove_orphans(&self, live: &HashSet<ArtifactName>, ttl: Duration, report: &mut SweepReport) {
        let files = match self.cache.storage().list_artifacts() {
            Ok(files) => files,
            Err(e) => {
                log::error!("Sweep could not list artifacts: {}", e);
                report.errors += 1;
                return;
            }
        };

        let now = SystemTime::now();
        for file in files {
            if live.contains(&file.name) {
                continue;
            }
            let age = now.duration_since(file.modified).unwrap_or_default();
            if age <= ttl {
                continue;
            }
            match purge_artifact(&self.cache, &self.history, &file.name) {
                Ok(purge) => {
                    report.orphans_removed += 1;
                    report.absorb(&purge);
                }
                Err(e) => {
                    log::error!("Failed to remove orphan {}: {}", file.name, e);
                    report.errors += 1;
                }
            }
        }
    }

    /// Start the sweep loop in a background thread.
    /// Accepts a trigger receiver for manual sweep requests.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let sweeper = self.clone();

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to start sweeper runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async {
                tokio::select! {
                    _ = tokio::time::sleep(sweeper.startup_delay) => {},
                    Ok(()) = trigger_rx.recv() => {},
                }

                let mut interval_timer = tokio::time::interval(sweeper.interval);
                interval_timer.tick().await; // skip immediate first tick

                loop {
                    if sweeper.is_stopped() {
                        break;
                    }

                    sweeper.sweep_once();

                    tokio::select! {
                        _ = interval_timer.tick() => {},
                        Ok(()) = trigger_rx.recv() => {
                            log::info!("Manual sweep triggered");
                        },
                    }
                }
            });
        })
    }

    /// Signals the sweeper to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ExpirySweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirySweeper")
            .field("interval", &self.interval)
            .field("startup_delay", &self.startup_delay)
            .finish_non_exhaustive()
    }
}
