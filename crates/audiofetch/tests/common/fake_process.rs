//! Scripted extraction process.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Semaphore};

use audiofetch::extraction::{
    AttemptRequest, ExitSummary, ExtractionEvent, ExtractionHandle, ExtractionProcess,
};
use audiofetch::ExtractionError;

/// What the next launch does.
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    /// Reports progress, writes the artifact and exits 0.
    Produce,
    /// Prints `stderr` and exits with `code`.
    Fail { code: i32, stderr: String },
    /// The binary cannot be started.
    LaunchError,
}

impl FakeOutcome {
    pub fn fail(stderr: &str) -> Self {
        FakeOutcome::Fail {
            code: 1,
            stderr: stderr.to_string(),
        }
    }
}

/// Plays queued outcomes in order, then `Produce` for every further launch.
pub struct FakeProcess {
    outcomes: Mutex<VecDeque<FakeOutcome>>,
    launches: Mutex<Vec<AttemptRequest>>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeProcess {
    pub fn new() -> Self {
        Self::scripted(Vec::new())
    }

    pub fn scripted(outcomes: Vec<FakeOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            launches: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Every launched process blocks until a permit is added to `gate`.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn launches(&self) -> Vec<AttemptRequest> {
        self.launches.lock().unwrap().clone()
    }

    pub fn launched_strategies(&self) -> Vec<String> {
        self.launches()
            .into_iter()
            .map(|r| r.strategy.name)
            .collect()
    }
}

fn artifact_path(request: &AttemptRequest) -> PathBuf {
    let template = request.output_template.to_string_lossy();
    PathBuf::from(template.replace("%(ext)s", request.format.extension()))
}

#[async_trait]
impl ExtractionProcess for FakeProcess {
    async fn launch(&self, request: &AttemptRequest) -> Result<ExtractionHandle, ExtractionError> {
        self.launches.lock().unwrap().push(request.clone());
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(FakeOutcome::Produce);

        if let FakeOutcome::LaunchError = outcome {
            return Err(ExtractionError::Launch {
                program: "yt-dlp".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"),
            });
        }

        let (tx, rx) = mpsc::channel(16);
        let (cancel_tx, _cancel_rx) = oneshot::channel();
        let gate = self.gate.clone();
        let path = artifact_path(request);

        tokio::spawn(async move {
            if let Some(gate) = gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            match outcome {
                FakeOutcome::Produce => {
                    let _ = tx.send(ExtractionEvent::Progress(25.0)).await;
                    let _ = tx.send(ExtractionEvent::Progress(75.0)).await;
                    std::fs::write(&path, b"audio").unwrap();
                    let _ = tx
                        .send(ExtractionEvent::Exited(ExitSummary {
                            success: true,
                            code: Some(0),
                        }))
                        .await;
                }
                FakeOutcome::Fail { code, stderr } => {
                    let _ = tx.send(ExtractionEvent::Output(stderr)).await;
                    let _ = tx
                        .send(ExtractionEvent::Exited(ExitSummary {
                            success: false,
                            code: Some(code),
                        }))
                        .await;
                }
                FakeOutcome::LaunchError => unreachable!(),
            }
        });

        Ok(ExtractionHandle::new(rx, cancel_tx))
    }
}
