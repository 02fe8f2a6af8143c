pub mod cache;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod format;
pub mod history;
pub mod identifier;
pub mod jobs;
pub mod logging;
pub mod metadata;
pub mod service;
pub mod storage;
pub mod sweeper;

pub use cache::{CacheEntry, CacheInspection, CacheStore};
pub use config::{load_config, Config};
pub use error::{
    AudioFetchError, ConfigError, ExtractionError, RequestError, Result, StorageError,
};
pub use extraction::{ExtractionProcess, YtDlpProcess};
pub use format::AudioFormat;
pub use history::{HistoryEntry, HistoryLedger};
pub use identifier::extract_identifier;
pub use jobs::{DeleteReport, Job, JobManager, JobStatus, SubmitResponse};
pub use logging::init_logging;
pub use metadata::{MetadataResolver, OEmbedResolver, StaticMetadata, VideoMetadata};
pub use service::AudioFetch;
pub use sweeper::{ExpirySweeper, SweepReport};
