use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;

// `[download]  42.3% of 3.45MiB at 1.2MiB/s ETA 00:02`
static RE_DOWNLOAD_PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").unwrap());

/// Extracts the completion percentage from a downloader progress line,
/// clamped to `0..=100`.
pub fn parse_download_progress(line: &str) -> Option<f32> {
    let caps = RE_DOWNLOAD_PERCENT.captures(line)?;
    let value: f32 = caps.get(1)?.as_str().parse().ok()?;
    Some(value.clamp(0.0, 100.0))
}

/// Events emitted by the orchestrator while working through the ladder.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    AttemptStarted { attempt: usize, strategy: String },
    Progress { percent: f32 },
    AttemptFailed { strategy: String, reason: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// High-water mark of one attempt. Values that would move progress
/// backwards are dropped.
#[derive(Debug, Default)]
pub(crate) struct AttemptProgress {
    high_water: Option<f32>,
}

impl AttemptProgress {
    pub(crate) fn observe(&mut self, percent: f32) -> Option<f32> {
        match self.high_water {
            Some(current) if percent <= current => None,
            _ => {
                self.high_water = Some(percent);
                Some(percent)
            }
        }
    }
}

/// Bounded tail of tool output kept for failure messages.
#[derive(Debug)]
pub(crate) struct DiagnosticTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticTail {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, line: String) {
        let line = line.trim_end();
        if line.is_empty() || self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    /// Lines that look like tool errors, or the whole tail when none do.
    pub(crate) fn render(&self) -> String {
        let errors: Vec<&str> = self
            .lines
            .iter()
            .map(String::as_str)
            .filter(|l| l.starts_with("ERROR") || l.starts_with("WARNING"))
            .collect();
        if errors.is_empty() {
            self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
        } else {
            errors.join("\n")
        }
    }
}
