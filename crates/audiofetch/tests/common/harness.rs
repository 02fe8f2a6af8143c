//! Test harness for isolated test execution.
//!
//! The `TestHarness` struct wires a complete service over a temporary
//! directory, an in-memory database and a scripted downloader.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use audiofetch::db::Database;
use audiofetch::metadata::{MetadataResolver, StaticMetadata, VideoMetadata};
use audiofetch::{AudioFetch, Config, Job, JobManager};

use super::fake_process::FakeProcess;

pub const VIDEO_ID: &str = "dQw4w9WgXcQ";
pub const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
pub const TITLE: &str = "Never Gonna Give You Up";

/// Returns queued metadata in order, then the placeholder.
pub struct SequenceMetadata {
    queue: Mutex<VecDeque<VideoMetadata>>,
}

impl SequenceMetadata {
    pub fn new(items: Vec<VideoMetadata>) -> Self {
        Self {
            queue: Mutex::new(items.into()),
        }
    }
}

#[async_trait]
impl MetadataResolver for SequenceMetadata {
    async fn resolve(&self, _identifier: &str) -> VideoMetadata {
        self.queue.lock().unwrap().pop_front().unwrap_or_default()
    }
}

pub fn titled(title: &str) -> VideoMetadata {
    VideoMetadata {
        title: title.to_string(),
        thumbnail: Some(format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", VIDEO_ID)),
    }
}

/// Isolated service instance for integration tests.
pub struct TestHarness {
    /// Temporary directory holding the downloads directory.
    temp_dir: TempDir,
    pub downloads_dir: PathBuf,
    pub process: Arc<FakeProcess>,
    pub service: AudioFetch,
}

impl TestHarness {
    /// Service with a downloader that always succeeds.
    pub fn new() -> Self {
        Self::with_process(FakeProcess::new())
    }

    pub fn with_process(process: FakeProcess) -> Self {
        Self::build(
            process,
            Arc::new(StaticMetadata::new(titled(TITLE))),
            |_| {},
        )
    }

    pub fn build<F>(
        process: FakeProcess,
        resolver: Arc<dyn MetadataResolver>,
        customize: F,
    ) -> Self
    where
        F: FnOnce(&mut Config),
    {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let downloads_dir = temp_dir.path().join("downloads");

        let mut config = Config {
            downloads_directory: downloads_dir.clone(),
            database_path: temp_dir.path().join("audiofetch.db"),
            public_prefix: "/downloads".to_string(),
            ..Config::default()
        };
        config.extraction.attempt_timeout_secs = 5;
        customize(&mut config);

        let process = Arc::new(process);
        let db = Database::open_in_memory().expect("Failed to open database");
        let service = AudioFetch::with_database(config, db, process.clone(), resolver)
            .expect("Failed to build service");

        Self {
            temp_dir,
            downloads_dir,
            process,
            service,
        }
    }

    pub fn manager(&self) -> &JobManager {
        self.service.manager()
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.downloads_dir.join(name)
    }

    /// Polls the job until it leaves the processing state.
    pub async fn wait_for_terminal(&self, job_id: &str) -> Job {
        for _ in 0..500 {
            let job = self
                .manager()
                .status(job_id)
                .expect("job disappeared while waiting");
            if job.is_finished() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish in time", job_id);
    }
}
