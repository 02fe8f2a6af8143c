//! Request intake, job lifecycle and the artifact-level operations exposed
//! to clients.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::cache::{CacheEntry, CacheInspection, CacheStore};
use crate::cleanup::purge_artifact;
use crate::db::DatabaseError;
use crate::error::{RequestError, Result};
use crate::extraction::{
    ExtractionOrchestrator, ExtractionOutcome, ExtractionRequest, ProgressEvent, ProgressReporter,
};
use crate::format::AudioFormat;
use crate::history::{HistoryEntry, HistoryLedger};
use crate::identifier::extract_identifier;
use crate::jobs::job::{Job, JobStatus};
use crate::jobs::store::JobStore;
use crate::metadata::{MetadataResolver, VideoMetadata, UNKNOWN_TITLE};
use crate::storage::ArtifactName;

// ─── Responses ──────────────────────────────────────────────────────────────

/// Immediate answer to a submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    #[serde(flatten)]
    pub job: Job,
    /// True when the request joined a job already running for the same
    /// artifact instead of starting a new one.
    pub attached: bool,
}

impl SubmitResponse {
    pub fn job_id(&self) -> &str {
        &self.job.job_id
    }

    pub fn status(&self) -> JobStatus {
        self.job.status
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub artifact_name: String,
    pub file_removed: bool,
    pub cache_evicted: bool,
    pub history_removed: usize,
}

// ─── Progress bridge ────────────────────────────────────────────────────────

/// Forwards orchestrator events into the job record.
struct JobProgress {
    jobs: JobStore,
    job_id: String,
}

impl ProgressReporter for JobProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::AttemptStarted { strategy, .. } => {
                self.jobs.update(&self.job_id, |job| job.strategy = Some(strategy));
            }
            ProgressEvent::Progress { percent } => {
                self.jobs.update(&self.job_id, |job| job.set_progress(percent));
            }
            ProgressEvent::AttemptFailed { .. } => {}
        }
    }
}

// ─── JobManager ─────────────────────────────────────────────────────────────

/// Owns the job registry and drives each job from submission to a terminal
/// state. Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct JobManager {
    jobs: JobStore,
    cache: CacheStore,
    history: HistoryLedger,
    orchestrator: Arc<ExtractionOrchestrator>,
    resolver: Arc<dyn MetadataResolver>,
    /// `(identifier, format)` to the id of the job currently producing it.
    in_flight: Arc<Mutex<HashMap<ArtifactName, String>>>,
    permits: Arc<Semaphore>,
    public_prefix: String,
}

enum Admission {
    Cached(CacheEntry),
    Attached(Job),
    Started(Job),
}

impl JobManager {
    pub fn new(
        jobs: JobStore,
        cache: CacheStore,
        history: HistoryLedger,
        orchestrator: Arc<ExtractionOrchestrator>,
        resolver: Arc<dyn MetadataResolver>,
        max_concurrent_extractions: usize,
        public_prefix: impl Into<String>,
    ) -> Self {
        Self {
            jobs,
            cache,
            history,
            orchestrator,
            resolver,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(max_concurrent_extractions.max(1))),
            public_prefix: public_prefix.into(),
        }
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// Validates a request and either serves it from the cache or starts a
    /// background job. Must be called from within a tokio runtime.
    pub async fn submit(
        &self,
        url: &str,
        format: &str,
    ) -> std::result::Result<SubmitResponse, RequestError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(RequestError::MissingUrl);
        }
        let format: AudioFormat = format.parse()?;
        let identifier = extract_identifier(url)
            .ok_or_else(|| RequestError::IdentifierNotFound(url.to_string()))?;

        match self.admit(url, &identifier, format)? {
            Admission::Cached(entry) => self.serve_cached(url, entry).await,
            Admission::Attached(job) => {
                log::info!(
                    "Request for {}.{} joined running job {}",
                    identifier,
                    format,
                    job.job_id
                );
                Ok(SubmitResponse {
                    job,
                    attached: true,
                })
            }
            Admission::Started(job) => {
                log::info!("Started job {} for {}.{}", job.job_id, identifier, format);
                let manager = self.clone();
                let request = ExtractionRequest {
                    url: url.to_string(),
                    identifier,
                    format,
                };
                let job_id = job.job_id.clone();
                tokio::spawn(async move { manager.run_job(job_id, request).await });
                Ok(SubmitResponse {
                    job,
                    attached: false,
                })
            }
        }
    }

    /// Current snapshot of a job, or `None` when unknown or expired.
    pub fn status(&self, job_id: &str) -> Option<Job> {
        self.jobs.get(job_id)
    }

    /// Removes an artifact, its cache record and its history entries.
    /// Deleting something that does not exist succeeds.
    pub fn delete(&self, artifact_name: &str) -> Result<DeleteReport> {
        let name = ArtifactName::parse(artifact_name)
            .ok_or_else(|| RequestError::InvalidArtifactName(artifact_name.to_string()))?;
        let report = purge_artifact(&self.cache, &self.history, &name)?;
        log::info!("Deleted {}", name);
        Ok(DeleteReport {
            artifact_name: name.file_name(),
            file_removed: report.file_removed,
            cache_evicted: report.cache_evicted,
            history_removed: report.history_removed,
        })
    }

    /// Served artifacts, most recent first.
    pub fn history(&self) -> std::result::Result<Vec<HistoryEntry>, DatabaseError> {
        self.history.list()
    }

    pub fn cache_overview(&self) -> std::result::Result<Vec<CacheInspection>, DatabaseError> {
        self.cache.inspect()
    }

    pub fn download_path(&self, artifact_name: &str) -> String {
        format!("{}/{}", self.public_prefix.trim_end_matches('/'), artifact_name)
    }

    /// Decides how a request is served. The cache lookup and the in-flight
    /// check happen under one lock, and a finishing job writes the cache
    /// before clearing its in-flight marker, so every request either sees
    /// the cached artifact or the running job.
    fn admit(
        &self,
        url: &str,
        identifier: &str,
        format: AudioFormat,
    ) -> std::result::Result<Admission, RequestError> {
        let key = ArtifactName::new(identifier, format);
        let mut in_flight = self.lock_in_flight();

        // Running jobs never leave the store, so a marker without a record
        // belongs to a job that finished and aged out before releasing it.
        if let Some(job_id) = in_flight.get(&key) {
            if let Some(job) = self.jobs.get(job_id) {
                if !job.is_finished() {
                    return Ok(Admission::Attached(job));
                }
            }
        }

        if let Some(entry) = self.cache.lookup(identifier, format)? {
            return Ok(Admission::Cached(entry));
        }

        let job = Job::processing(url, identifier, format);
        in_flight.insert(key, job.job_id.clone());
        self.jobs.insert(job.clone());
        Ok(Admission::Started(job))
    }

    async fn serve_cached(
        &self,
        url: &str,
        mut entry: CacheEntry,
    ) -> std::result::Result<SubmitResponse, RequestError> {
        // Cached metadata is trusted unless it is the lookup-failure
        // placeholder, in which case the lookup is retried once.
        if entry.title == UNKNOWN_TITLE {
            let metadata = self.resolver.resolve(&entry.identifier).await;
            if !metadata.is_placeholder() {
                if let Some(updated) = self.cache.refresh_metadata(
                    &entry.identifier,
                    entry.format,
                    &metadata.title,
                    metadata.thumbnail.as_deref(),
                )? {
                    entry = updated;
                }
            }
        }

        self.history.append(&HistoryEntry {
            url: url.to_string(),
            artifact_name: entry.artifact_name.clone(),
            title: entry.title.clone(),
            thumbnail: entry.thumbnail.clone(),
            identifier: entry.identifier.clone(),
            format: entry.format,
            timestamp: Utc::now(),
        })?;

        let job = Job::from_cache(url, &entry, self.download_path(&entry.artifact_name));
        self.jobs.insert(job.clone());
        log::info!("Served {} from cache (job {})", entry.artifact_name, job.job_id);
        Ok(SubmitResponse {
            job,
            attached: false,
        })
    }

    async fn run_job(self, job_id: String, request: ExtractionRequest) {
        let span = tracing::info_span!(
            "job",
            job_id = %job_id,
            identifier = %request.identifier,
            format = %request.format,
        );

        async {
            let key = ArtifactName::new(&request.identifier, request.format);

            let _permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    self.jobs.update(&job_id, |job| {
                        job.fail("Extraction queue is shut down".to_string())
                    });
                    self.release(&key, &job_id);
                    return;
                }
            };

            let metadata = self.resolver.resolve(&request.identifier).await;
            self.jobs.update(&job_id, |job| {
                job.title = Some(metadata.title.clone());
                job.thumbnail = metadata.thumbnail.clone();
            });

            let reporter = JobProgress {
                jobs: self.jobs.clone(),
                job_id: job_id.clone(),
            };

            match self.orchestrator.run(&request, &reporter).await {
                Ok(outcome) => {
                    if let Err(e) = self.record_success(&request, &metadata, &outcome) {
                        log::error!("Failed to record artifact {}: {}", outcome.artifact, e);
                        self.jobs.update(&job_id, |job| {
                            job.fail(format!("Failed to record artifact: {}", e))
                        });
                    } else {
                        let artifact_name = outcome.artifact.file_name();
                        let download_path = self.download_path(&artifact_name);
                        self.jobs.update(&job_id, |job| {
                            job.complete(artifact_name, download_path, outcome.strategy.clone())
                        });
                    }
                }
                Err(e) => {
                    log::error!("Job failed: {}", e);
                    self.jobs.update(&job_id, |job| job.fail(e.to_string()));
                }
            }

            self.release(&key, &job_id);
        }
        .instrument(span)
        .await
    }

    fn record_success(
        &self,
        request: &ExtractionRequest,
        metadata: &VideoMetadata,
        outcome: &ExtractionOutcome,
    ) -> std::result::Result<(), DatabaseError> {
        let entry = self.cache.insert(
            &request.identifier,
            request.format,
            &metadata.title,
            metadata.thumbnail.as_deref(),
        )?;
        self.history.append(&HistoryEntry {
            url: request.url.clone(),
            artifact_name: entry.artifact_name,
            title: entry.title,
            thumbnail: entry.thumbnail,
            identifier: entry.identifier,
            format: entry.format,
            timestamp: Utc::now(),
        })?;
        Ok(())
    }

    fn release(&self, key: &ArtifactName, job_id: &str) {
        let mut in_flight = self.lock_in_flight();
        if in_flight.get(key).map(String::as_str) == Some(job_id) {
            in_flight.remove(key);
        }
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<ArtifactName, String>> {
        match self.in_flight.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("In-flight lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("jobs", &self.jobs)
            .field("public_prefix", &self.public_prefix)
            .finish_non_exhaustive()
    }
}
