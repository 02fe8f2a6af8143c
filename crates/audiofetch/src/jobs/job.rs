use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::CacheEntry;
use crate::format::AudioFormat;

/// Status of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

/// Snapshot of one extraction request as seen by a polling client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job identifier.
    pub job_id: String,
    pub status: JobStatus,
    /// Download progress in percent, `0..=100`.
    pub progress: f32,
    pub url: String,
    pub identifier: String,
    pub format: AudioFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Artifact file name (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_name: Option<String>,
    /// Public download path (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_path: Option<String>,
    /// Error message (if failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the job was served from the cache without extraction.
    #[serde(default)]
    pub cached: bool,
    /// Strategy currently running, or the one that produced the artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn processing(url: &str, identifier: &str, format: AudioFormat) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: JobStatus::Processing,
            progress: 0.0,
            url: url.to_string(),
            identifier: identifier.to_string(),
            format,
            title: None,
            thumbnail: None,
            artifact_name: None,
            download_path: None,
            error: None,
            cached: false,
            strategy: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A job that is complete from the start because the artifact was
    /// already cached.
    pub fn from_cache(url: &str, entry: &CacheEntry, download_path: String) -> Self {
        let mut job = Self::processing(url, &entry.identifier, entry.format);
        job.status = JobStatus::Completed;
        job.progress = 100.0;
        job.title = Some(entry.title.clone());
        job.thumbnail = entry.thumbnail.clone();
        job.artifact_name = Some(entry.artifact_name.clone());
        job.download_path = Some(download_path);
        job.cached = true;
        job
    }

    /// Records progress while the job is still processing.
    pub fn set_progress(&mut self, percent: f32) {
        if self.status == JobStatus::Processing {
            self.progress = percent.clamp(0.0, 100.0);
        }
    }

    pub fn complete(&mut self, artifact_name: String, download_path: String, strategy: String) {
        self.status = JobStatus::Completed;
        self.progress = 100.0;
        self.artifact_name = Some(artifact_name);
        self.download_path = Some(download_path);
        self.strategy = Some(strategy);
        self.error = None;
    }

    pub fn fail(&mut self, error: String) {
        self.status = JobStatus::Error;
        self.error = Some(error);
    }

    /// Returns true if this job is finished (completed or failed).
    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Error)
    }
}
