use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::ExtractionError;
use crate::extraction::strategy::ExtractionStrategy;
use crate::format::AudioFormat;

/// Everything an adapter needs to run one attempt.
#[derive(Debug, Clone)]
pub struct AttemptRequest {
    pub url: String,
    pub format: AudioFormat,
    pub strategy: ExtractionStrategy,
    /// Path template with an `%(ext)s` placeholder for the final extension.
    pub output_template: PathBuf,
}

/// How the tool process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitSummary {
    pub success: bool,
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

/// Observation from a running attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionEvent {
    Progress(f32),
    Output(String),
    Exited(ExitSummary),
}

/// Stream of events from one running attempt, plus a way to stop it.
///
/// `Exited` is always the last event. Dropping the handle before the
/// process exits kills it.
pub struct ExtractionHandle {
    events: mpsc::Receiver<ExtractionEvent>,
    cancel: Option<oneshot::Sender<()>>,
    finished: bool,
}

impl ExtractionHandle {
    pub fn new(events: mpsc::Receiver<ExtractionEvent>, cancel: oneshot::Sender<()>) -> Self {
        Self {
            events,
            cancel: Some(cancel),
            finished: false,
        }
    }

    /// Handle that replays a fixed sequence of events.
    pub fn from_events(events: Vec<ExtractionEvent>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            let _ = tx.try_send(event);
        }
        let (cancel_tx, _cancel_rx) = oneshot::channel();
        Self::new(rx, cancel_tx)
    }

    /// Next event, or `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<ExtractionEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().await;
        if matches!(event, None | Some(ExtractionEvent::Exited(_))) {
            self.finished = true;
        }
        event
    }

    /// Asks the adapter to terminate the process. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl std::fmt::Debug for ExtractionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionHandle")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Boundary to the external downloader.
///
/// An `Err` from `launch` means the tool could not be started at all and
/// is never retried with another strategy.
#[async_trait]
pub trait ExtractionProcess: Send + Sync {
    async fn launch(&self, request: &AttemptRequest) -> Result<ExtractionHandle, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_events_replays_until_exit() {
        let exit = ExitSummary {
            success: true,
            code: Some(0),
        };
        let mut handle = ExtractionHandle::from_events(vec![
            ExtractionEvent::Output("hello".to_string()),
            ExtractionEvent::Progress(12.5),
            ExtractionEvent::Exited(exit),
        ]);

        assert_eq!(
            handle.next_event().await,
            Some(ExtractionEvent::Output("hello".to_string()))
        );
        assert_eq!(handle.next_event().await, Some(ExtractionEvent::Progress(12.5)));
        assert_eq!(handle.next_event().await, Some(ExtractionEvent::Exited(exit)));
        assert_eq!(handle.next_event().await, None);
    }

    #[tokio::test]
    async fn test_stream_without_exit_ends() {
        let mut handle = ExtractionHandle::from_events(Vec::new());
        assert_eq!(handle.next_event().await, None);
        handle.cancel();
        handle.cancel();
    }
}
