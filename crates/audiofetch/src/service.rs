//! Wiring of the store, cache, ledger, extraction and jobs into one
//! service handle.

use std::sync::Arc;

use crate::cache::CacheStore;
use crate::config::{validate_config, Config};
use crate::db::Database;
use crate::error::Result;
use crate::extraction::{ExtractionOrchestrator, ExtractionProcess, StrategyLadder, YtDlpProcess};
use crate::history::HistoryLedger;
use crate::jobs::{JobManager, JobStore};
use crate::metadata::{MetadataResolver, OEmbedResolver, StaticMetadata};
use crate::storage::ArtifactStorage;
use crate::sweeper::ExpirySweeper;

/// A fully wired service. The sweeper is built but not started; call
/// `sweeper().start(..)` to run it in the background.
#[derive(Debug)]
pub struct AudioFetch {
    config: Config,
    manager: JobManager,
    sweeper: ExpirySweeper,
}

impl AudioFetch {
    /// Builds the service with the real `yt-dlp` adapter and oEmbed lookups.
    pub fn from_config(config: Config) -> Result<Self> {
        let process: Arc<dyn ExtractionProcess> =
            Arc::new(YtDlpProcess::new(config.extraction.binary.clone()));
        let resolver: Arc<dyn MetadataResolver> = if config.metadata.enabled {
            Arc::new(OEmbedResolver::new(
                config.metadata.endpoint.clone(),
                config.metadata.timeout(),
            )?)
        } else {
            Arc::new(StaticMetadata::default())
        };
        Self::open(config, process, resolver)
    }

    /// Opens the on-disk store at `config.database_path`.
    pub fn open(
        config: Config,
        process: Arc<dyn ExtractionProcess>,
        resolver: Arc<dyn MetadataResolver>,
    ) -> Result<Self> {
        validate_config(&config)?;
        let db = Database::open(&config.database_path)?;
        Self::with_database(config, db, process, resolver)
    }

    pub fn with_database(
        config: Config,
        db: Database,
        process: Arc<dyn ExtractionProcess>,
        resolver: Arc<dyn MetadataResolver>,
    ) -> Result<Self> {
        let storage = ArtifactStorage::new(&config.downloads_directory);
        storage.ensure_directory()?;

        let cache = CacheStore::new(db.clone(), storage.clone(), config.cache.ttl());
        let history = HistoryLedger::new(db);

        let ladder = StrategyLadder::from_config(&config.extraction);
        log::info!(
            "Extraction ladder: {}",
            ladder
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        let orchestrator = ExtractionOrchestrator::new(
            process,
            ladder,
            storage,
            config.extraction.attempt_timeout(),
            config.extraction.diagnostic_lines,
        );

        let jobs = JobStore::new(config.jobs.retention(), config.jobs.max_jobs);
        let manager = JobManager::new(
            jobs,
            cache.clone(),
            history.clone(),
            Arc::new(orchestrator),
            resolver,
            config.jobs.max_concurrent_extractions,
            config.public_prefix.clone(),
        );

        let sweeper = ExpirySweeper::new(
            cache,
            history,
            config.cache.sweep_interval(),
            config.cache.sweep_startup_delay(),
        );

        log::info!(
            "Serving artifacts from {}",
            config.downloads_directory.display()
        );

        Ok(Self {
            config,
            manager,
            sweeper,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manager(&self) -> &JobManager {
        &self.manager
    }

    pub fn sweeper(&self) -> &ExpirySweeper {
        &self.sweeper
    }
}
