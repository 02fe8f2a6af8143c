//! Audio extraction through an external downloader with a fallback ladder.

pub mod orchestrator;
pub mod process;
pub mod progress;
pub mod strategy;
pub mod ytdlp;

pub use orchestrator::{ExtractionOrchestrator, ExtractionOutcome, ExtractionRequest};
pub use process::{
    AttemptRequest, ExitSummary, ExtractionEvent, ExtractionHandle, ExtractionProcess,
};
pub use progress::{parse_download_progress, NoopProgress, ProgressEvent, ProgressReporter};
pub use strategy::{CredentialSource, ExtractionStrategy, StrategyLadder};
pub use ytdlp::YtDlpProcess;
