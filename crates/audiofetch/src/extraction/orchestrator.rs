use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use crate::error::ExtractionError;
use crate::extraction::process::{AttemptRequest, ExtractionEvent, ExtractionProcess};
use crate::extraction::progress::{AttemptProgress, DiagnosticTail, ProgressEvent, ProgressReporter};
use crate::extraction::strategy::{ExtractionStrategy, StrategyLadder};
use crate::format::AudioFormat;
use crate::storage::{ArtifactName, ArtifactStorage};

/// A validated request for one artifact.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub url: String,
    pub identifier: String,
    pub format: AudioFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutcome {
    pub artifact: ArtifactName,
    /// Name of the strategy that produced the artifact.
    pub strategy: String,
    pub attempts: usize,
}

enum AttemptResult {
    Produced,
    Failed { reason: String, diagnostics: String },
}

/// Runs the strategy ladder for a request until an attempt produces the
/// artifact or every strategy has failed.
pub struct ExtractionOrchestrator {
    process: Arc<dyn ExtractionProcess>,
    ladder: StrategyLadder,
    storage: ArtifactStorage,
    attempt_timeout: Duration,
    diagnostic_lines: usize,
}

impl ExtractionOrchestrator {
    pub fn new(
        process: Arc<dyn ExtractionProcess>,
        ladder: StrategyLadder,
        storage: ArtifactStorage,
        attempt_timeout: Duration,
        diagnostic_lines: usize,
    ) -> Self {
        Self {
            process,
            ladder,
            storage,
            attempt_timeout,
            diagnostic_lines,
        }
    }

    pub fn ladder(&self) -> &StrategyLadder {
        &self.ladder
    }

    pub async fn run(
        &self,
        request: &ExtractionRequest,
        reporter: &dyn ProgressReporter,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let artifact = ArtifactName::new(&request.identifier, request.format);
        let mut last_failure: Option<(String, String, String)> = None;

        for (index, strategy) in self.ladder.iter().enumerate() {
            let attempt = index + 1;
            let span = tracing::info_span!(
                "extraction_attempt",
                identifier = %request.identifier,
                strategy = %strategy.name,
                attempt,
            );

            reporter.report(ProgressEvent::AttemptStarted {
                attempt,
                strategy: strategy.name.clone(),
            });

            let result = self
                .attempt(request, strategy, &artifact, reporter)
                .instrument(span)
                .await?;

            match result {
                AttemptResult::Produced => {
                    log::info!(
                        "Extracted {} with strategy {} (attempt {})",
                        artifact,
                        strategy.name,
                        attempt
                    );
                    reporter.report(ProgressEvent::Progress { percent: 100.0 });
                    return Ok(ExtractionOutcome {
                        artifact,
                        strategy: strategy.name.clone(),
                        attempts: attempt,
                    });
                }
                AttemptResult::Failed {
                    reason,
                    diagnostics,
                } => {
                    log::warn!(
                        "Strategy {} failed for {}: {}",
                        strategy.name,
                        request.identifier,
                        reason
                    );
                    reporter.report(ProgressEvent::AttemptFailed {
                        strategy: strategy.name.clone(),
                        reason: reason.clone(),
                    });
                    last_failure = Some((strategy.name.clone(), reason, diagnostics));
                }
            }
        }

        match self.storage.discard_staged(&artifact) {
            Ok(0) => {}
            Ok(count) => log::debug!("Discarded {} staged files for {}", count, artifact),
            Err(e) => log::warn!("Failed to discard staged files for {}: {}", artifact, e),
        }

        Err(ExtractionError::Exhausted {
            attempts: self.ladder.len(),
            message: exhausted_message(self.ladder.len(), last_failure),
        })
    }

    async fn attempt(
        &self,
        request: &ExtractionRequest,
        strategy: &ExtractionStrategy,
        artifact: &ArtifactName,
        reporter: &dyn ProgressReporter,
    ) -> Result<AttemptResult, ExtractionError> {
        self.storage.ensure_staging_directory(request.format)?;
        let attempt_request = AttemptRequest {
            url: request.url.clone(),
            format: request.format,
            strategy: strategy.clone(),
            output_template: self
                .storage
                .output_template(&request.identifier, request.format),
        };

        let mut handle = self.process.launch(&attempt_request).await?;
        let mut progress = AttemptProgress::default();
        let mut tail = DiagnosticTail::new(self.diagnostic_lines);

        let drained = tokio::time::timeout(self.attempt_timeout, async {
            while let Some(event) = handle.next_event().await {
                match event {
                    ExtractionEvent::Progress(percent) => {
                        if let Some(percent) = progress.observe(percent) {
                            reporter.report(ProgressEvent::Progress { percent });
                        }
                    }
                    ExtractionEvent::Output(line) => tail.push(line),
                    ExtractionEvent::Exited(summary) => return Some(summary),
                }
            }
            None
        })
        .await;

        let summary = match drained {
            Ok(Some(summary)) => summary,
            Ok(None) => {
                return Ok(AttemptResult::Failed {
                    reason: "output ended without an exit status".to_string(),
                    diagnostics: tail.render(),
                })
            }
            Err(_) => {
                handle.cancel();
                return Ok(AttemptResult::Failed {
                    reason: format!("timed out after {}s", self.attempt_timeout.as_secs()),
                    diagnostics: tail.render(),
                });
            }
        };

        if !summary.success {
            let reason = match summary.code {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            };
            return Ok(AttemptResult::Failed {
                reason,
                diagnostics: tail.render(),
            });
        }

        if !self.storage.promote(artifact)? {
            return Ok(AttemptResult::Failed {
                reason: format!("exited successfully but {} was not produced", artifact),
                diagnostics: tail.render(),
            });
        }

        Ok(AttemptResult::Produced)
    }
}

fn exhausted_message(attempts: usize, last_failure: Option<(String, String, String)>) -> String {
    let mut message = format!(
        "All {} download strategies failed. The video may be age-restricted, private or \
         unavailable in this region, the host may be blocking automated downloads, or \
         valid browser cookies may be required.",
        attempts
    );
    if let Some((strategy, reason, diagnostics)) = last_failure {
        message.push_str(&format!(" Last attempt ({}) {}.", strategy, reason));
        if !diagnostics.is_empty() {
            message.push_str(&format!(" Tool output:\n{}", diagnostics));
        }
    }
    message
}
