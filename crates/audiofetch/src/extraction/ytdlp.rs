use std::ffi::OsString;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command as TokioCommand};
use tokio::sync::{mpsc, oneshot};

use crate::error::ExtractionError;
use crate::extraction::process::{
    AttemptRequest, ExitSummary, ExtractionEvent, ExtractionHandle, ExtractionProcess,
};
use crate::extraction::progress::parse_download_progress;
use crate::extraction::strategy::CredentialSource;

/// Runs `yt-dlp` as a child process and streams its output.
#[derive(Debug, Clone)]
pub struct YtDlpProcess {
    binary: String,
}

impl YtDlpProcess {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Command line for one attempt. The URL always comes last, after `--`.
    pub fn build_args(request: &AttemptRequest) -> Vec<OsString> {
        let strategy = &request.strategy;
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            strategy.format_selector.clone().into(),
            "--extract-audio".into(),
            "--audio-format".into(),
            request.format.extension().into(),
            "--newline".into(),
            "--no-playlist".into(),
            // The sweeper ages files by mtime; keep it at download time.
            "--no-mtime".into(),
            "--socket-timeout".into(),
            strategy.socket_timeout.as_secs().to_string().into(),
            "--retries".into(),
            strategy.retries.to_string().into(),
        ];
        if strategy.force_ipv4 {
            args.push("--force-ipv4".into());
        }

        match &strategy.credentials {
            Some(CredentialSource::Browser(browser)) => {
                args.push("--cookies-from-browser".into());
                args.push(browser.clone().into());
            }
            Some(CredentialSource::CookieFile(path)) => {
                args.push("--cookies".into());
                args.push(path.clone().into_os_string());
            }
            None => {}
        }

        args.push("-o".into());
        args.push(request.output_template.clone().into_os_string());
        args.push("--".into());
        args.push(request.url.clone().into());
        args
    }
}

#[async_trait]
impl ExtractionProcess for YtDlpProcess {
    async fn launch(&self, request: &AttemptRequest) -> Result<ExtractionHandle, ExtractionError> {
        let mut cmd = TokioCommand::new(&self.binary);
        cmd.args(Self::build_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| ExtractionError::Launch {
            program: self.binary.clone(),
            source: e,
        })?;

        log::debug!(
            "Launched {} for {} (strategy {})",
            self.binary,
            request.url,
            request.strategy.name
        );

        let (events_tx, events_rx) = mpsc::channel(64);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        tokio::spawn(supervise(child, events_tx, cancel_rx));

        Ok(ExtractionHandle::new(events_rx, cancel_tx))
    }
}

/// Forwards output until the process exits, then sends `Exited` last.
async fn supervise(
    mut child: Child,
    events: mpsc::Sender<ExtractionEvent>,
    cancel: oneshot::Receiver<()>,
) {
    let stdout = child
        .stdout
        .take()
        .map(|out| tokio::spawn(forward_lines(out, events.clone())));
    let stderr = child
        .stderr
        .take()
        .map(|err| tokio::spawn(forward_lines(err, events.clone())));

    let status = tokio::select! {
        status = child.wait() => status,
        _ = cancel => {
            log::debug!("Killing extraction process");
            if let Err(e) = child.kill().await {
                log::warn!("Failed to kill extraction process: {}", e);
            }
            child.wait().await
        }
    };

    for reader in [stdout, stderr].into_iter().flatten() {
        let _ = reader.await;
    }

    let summary = match status {
        Ok(status) => ExitSummary {
            success: status.success(),
            code: status.code(),
        },
        Err(e) => {
            log::warn!("Failed to wait for extraction process: {}", e);
            ExitSummary {
                success: false,
                code: None,
            }
        }
    };
    let _ = events.send(ExtractionEvent::Exited(summary)).await;
}

async fn forward_lines<R>(reader: R, events: mpsc::Sender<ExtractionEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let event = match parse_download_progress(&line) {
            Some(percent) => ExtractionEvent::Progress(percent),
            None => ExtractionEvent::Output(line),
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
}
