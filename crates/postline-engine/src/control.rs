//! Operator control channel of a running scheduler.
//!
//! The daemon listens on a Unix socket under `.postline/`. Each connection
//! carries one NDJSON request line and gets one NDJSON reply line back, so
//! `status`, `schedule-now` and `publish` act on the live process instead of
//! a second one. The socket transport is Unix-only; elsewhere every
//! request reports [`ControlError::Unavailable`].

use crate::error::ControlError;
use crate::pipeline::{RunOptions, RunOutcome};
use crate::scheduler::{delay_from_secs, Scheduler, SchedulerStatus, IMMEDIATE_JOB_ID};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
#[cfg(unix)]
use std::time::Duration;
#[cfg(unix)]
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// Longest request line accepted from a client.
#[cfg(unix)]
const MAX_REQUEST_BYTES: u64 = 64 * 1024;

#[cfg(unix)]
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    Status,
    ScheduleNow { delay_secs: u64 },
    Publish { force: bool },
}

/// Wire form of a [`RunOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunSummary {
    Published {
        archetype: String,
        display_name: String,
        message_id: Option<i64>,
        poll_message_id: Option<i64>,
        poll_error: Option<String>,
    },
    DryRun {
        archetype: String,
        display_name: String,
    },
    Skipped {
        reason: String,
    },
}

impl From<&RunOutcome> for RunSummary {
    fn from(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::Published(r) => RunSummary::Published {
                archetype: r.archetype.to_string(),
                display_name: r.display_name.to_string(),
                message_id: r.message_id,
                poll_message_id: r.poll_message_id,
                poll_error: r.poll_error.clone(),
            },
            RunOutcome::DryRun(r) => RunSummary::DryRun {
                archetype: r.archetype.to_string(),
                display_name: r.display_name.to_string(),
            },
            RunOutcome::Skipped(reason) => RunSummary::Skipped {
                reason: reason.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ControlReply {
    Status(SchedulerStatus),
    Scheduled { id: String, fire_at: DateTime<Utc> },
    Ran { outcome: RunSummary },
    Failed { message: String },
}

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// Bind the control socket at `path`, readable and writable by the owner
/// only.
///
/// Only the holder of the scheduler lock calls this, so a socket file that
/// is already there was left by a daemon that no longer runs.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn bind(path: &Path) -> std::io::Result<UnixListener> {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed stale control socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    // SAFETY: umask only swaps the process file-mode mask.
    let old_umask = unsafe { libc::umask(0o177) };
    let listener = UnixListener::bind(path);
    // SAFETY: as above, restoring the previous mask.
    unsafe { libc::umask(old_umask) };
    listener
}

/// Accept control connections until the task is aborted.
#[cfg(unix)]
pub async fn serve(listener: UnixListener, scheduler: Arc<Scheduler>) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let scheduler = Arc::clone(&scheduler);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &scheduler).await {
                        tracing::warn!(error = %e, "control connection failed");
                    }
                });
            }
            Err(e) => tracing::warn!(error = %e, "control accept failed"),
        }
    }
}

#[cfg(unix)]
async fn handle_connection(stream: UnixStream, scheduler: &Arc<Scheduler>) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut line = String::new();
    let n = BufReader::new(read.take(MAX_REQUEST_BYTES))
        .read_line(&mut line)
        .await?;
    if n == 0 {
        return Ok(());
    }

    let reply = match serde_json::from_str::<ControlRequest>(line.trim()) {
        Ok(request) => dispatch(request, scheduler).await,
        Err(e) => ControlReply::Failed {
            message: format!("bad request: {e}"),
        },
    };

    let mut body = serde_json::to_vec(&reply)?;
    body.push(b'\n');
    write.write_all(&body).await?;
    write.flush().await
}

/// Execute one request against the scheduler.
pub async fn dispatch(request: ControlRequest, scheduler: &Arc<Scheduler>) -> ControlReply {
    tracing::info!(request = ?request, "control request");
    match request {
        ControlRequest::Status => match scheduler.status().await {
            Ok(status) => ControlReply::Status(status),
            Err(e) => ControlReply::Failed {
                message: e.to_string(),
            },
        },
        ControlRequest::ScheduleNow { delay_secs } => {
            let fire_at = scheduler.schedule_immediate(delay_from_secs(delay_secs));
            ControlReply::Scheduled {
                id: IMMEDIATE_JOB_ID.to_string(),
                fire_at,
            }
        }
        ControlRequest::Publish { force } => {
            match scheduler
                .run_now(RunOptions {
                    force,
                    dry_run: false,
                })
                .await
            {
                Ok(outcome) => ControlReply::Ran {
                    outcome: RunSummary::from(&outcome),
                },
                Err(e) => ControlReply::Failed {
                    message: e.to_string(),
                },
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Send one request to the daemon listening at `path` and wait for its
/// reply. [`ControlError::Unavailable`] means nothing is listening.
#[cfg(unix)]
pub async fn request(path: &Path, request: &ControlRequest) -> Result<ControlReply, ControlError> {
    let stream = match tokio::time::timeout(CONNECT_TIMEOUT, UnixStream::connect(path)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(ControlError::Unavailable(e)),
        Err(_) => {
            return Err(ControlError::Unavailable(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connect timed out",
            )))
        }
    };

    let (read, mut write) = stream.into_split();
    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    write.write_all(&line).await?;
    write.flush().await?;

    let mut reply = String::new();
    let n = BufReader::new(read).read_line(&mut reply).await?;
    if n == 0 {
        return Err(ControlError::Closed);
    }
    Ok(serde_json::from_str(reply.trim())?)
}

#[cfg(not(unix))]
pub async fn request(_path: &Path, _request: &ControlRequest) -> Result<ControlReply, ControlError> {
    Err(ControlError::Unavailable(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "control socket needs a Unix platform",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_tagged_by_op() {
        let line = serde_json::to_string(&ControlRequest::ScheduleNow { delay_secs: 60 }).unwrap();
        assert_eq!(line, r#"{"op":"schedule_now","delay_secs":60}"#);
        let parsed: ControlRequest = serde_json::from_str(r#"{"op":"publish","force":true}"#).unwrap();
        assert_eq!(parsed, ControlRequest::Publish { force: true });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn request_without_listener_is_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = request(&dir.path().join("control.sock"), &ControlRequest::Status)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Unavailable(_)));
    }
}
