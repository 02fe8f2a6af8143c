//! Removal of an artifact together with everything that references it.

use serde::Serialize;

use crate::cache::CacheStore;
use crate::error::Result;
use crate::history::HistoryLedger;
use crate::storage::ArtifactName;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    pub file_removed: bool,
    pub cache_evicted: bool,
    pub history_removed: usize,
}

/// Deletes the artifact file, its cache record and its history entries.
///
/// All three steps are attempted even when an earlier one fails; the first
/// error is returned afterwards. Repeating the call is harmless.
pub fn purge_artifact(
    cache: &CacheStore,
    history: &HistoryLedger,
    name: &ArtifactName,
) -> Result<PurgeReport> {
    let file_removed = cache.storage().remove(name);
    let cache_evicted = cache.evict(&name.identifier, name.format);
    let history_removed = history.remove_by_artifact_name(&name.file_name());

    let report = PurgeReport {
        file_removed: file_removed?,
        cache_evicted: cache_evicted?,
        history_removed: history_removed?,
    };
    log::debug!("Purged {}: {:?}", name, report);
    Ok(report)
}
