// Detection process invocation
// Spawns the detection script, merges stdout/stderr line by line and waits
// for exit under a hard timeout.

use super::AnalysisCommand;
use crate::error::InvocationError;
use crate::utils::text::preview;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

const LINE_CHANNEL_CAPACITY: usize = 256;

pub struct InvokeOptions {
    pub timeout: Duration,
    pub preview_chars: usize,
    /// Receives every output line as it arrives.
    pub line_observer: Option<mpsc::Sender<String>>,
    pub cancel: Option<CancellationToken>,
}

impl InvokeOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            preview_chars: 500,
            line_observer: None,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapturedOutput {
    /// Merged stdout and stderr, one `\n`-terminated line per output line.
    pub text: String,
    pub line_count: usize,
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

enum Outcome {
    Finished(String, usize, std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

async fn pump_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                log::warn!("Stopped reading detection output: {}", e);
                break;
            }
        }
    }
}

async fn collect_output(
    child: &mut Child,
    mut rx: mpsc::Receiver<String>,
    observer: Option<&mpsc::Sender<String>>,
) -> (String, usize, std::io::Result<ExitStatus>) {
    let mut captured = String::new();
    let mut line_count = 0;

    while let Some(line) = rx.recv().await {
        if let Some(tx) = observer {
            let _ = tx.send(line.clone()).await;
        }
        captured.push_str(&line);
        captured.push('\n');
        line_count += 1;
    }

    let status = child.wait().await;
    (captured, line_count, status)
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Run the detection command to completion.
///
/// A non-zero exit code is reported in the result and is not an error: the
/// caller judges success from the captured JSON lines. Empty output is fatal.
pub async fn run_detection(
    command: &AnalysisCommand,
    options: InvokeOptions,
) -> Result<CapturedOutput, InvocationError> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .envs(&command.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    log::info!("Running detection command: {}", command);
    let started = Instant::now();

    let mut child = cmd.spawn().map_err(|e| {
        log::error!("Failed to spawn detection command `{}`: {}", command, e);
        InvocationError::Spawn(e)
    })?;

    let (tx, rx) = mpsc::channel::<String>(LINE_CHANNEL_CAPACITY);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump_lines(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump_lines(stderr, tx.clone()));
    }
    drop(tx);

    let outcome = {
        let collect = collect_output(&mut child, rx, options.line_observer.as_ref());
        tokio::pin!(collect);

        tokio::select! {
            (text, lines, status) = &mut collect => Outcome::Finished(text, lines, status),
            _ = tokio::time::sleep(options.timeout) => Outcome::TimedOut,
            _ = cancelled(options.cancel.as_ref()) => Outcome::Cancelled,
        }
    };

    let (text, line_count, status) = match outcome {
        Outcome::Finished(text, lines, status) => (text, lines, status),
        Outcome::TimedOut => {
            let _ = child.kill().await;
            log::error!(
                "Detection command timed out after {}s: {}",
                options.timeout.as_secs(),
                command
            );
            return Err(InvocationError::TimedOut(options.timeout.as_secs()));
        }
        Outcome::Cancelled => {
            let _ = child.kill().await;
            log::warn!("Detection command cancelled: {}", command);
            return Err(InvocationError::Cancelled);
        }
    };

    let status = status.map_err(InvocationError::Wait)?;
    let exit_code = status.code();
    let elapsed = started.elapsed();

    log::info!(
        "Detection exited with code {:?} after {:.1}s ({} lines, {} bytes)",
        exit_code,
        elapsed.as_secs_f64(),
        line_count,
        text.len()
    );

    if text.trim().is_empty() {
        log::error!("Detection produced no output: {}", command);
        return Err(InvocationError::NoOutput { exit_code });
    }

    if !status.success() {
        log::warn!(
            "Detection exited non-zero ({:?}); judging result from output",
            exit_code
        );
    }
    log::debug!("Detection output preview: {}", preview(&text, options.preview_chars));

    Ok(CapturedOutput {
        text,
        line_count,
        exit_code,
        elapsed,
    })
}
