//! Job state machine: the single in-flight command slot.
//!
//! [`JobController`] owns at most one active job at a time and applies
//! inbound frames to it. It is deliberately synchronous and transport-free:
//! the engine task calls into it from the one dispatch path, and tests can
//! drive it frame by frame without a socket.
//!
//! # Correlation
//!
//! The job id is unknown at submit time. The slot holds the submitted
//! command text; the first `started` frame whose command matches consumes
//! that pending cell and locks the job id. Every later frame is matched
//! strictly by job id — frames for any other id are stale (a job that
//! already timed out or was killed) and are discarded.
//!
//! # Retirement
//!
//! A job leaves the slot through exactly one of: a terminal frame from the
//! remote (`done`/`killed`/`error`) or the local timeout. Terminal states
//! are absorbing by construction — retirement removes the job, so nothing
//! can transition it again. The kill request never retires a job by itself.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::error::EngineError;
use crate::protocol::InboundFrame;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Submitted, awaiting the remote's started ack.
    Pending,
    /// Acknowledged; job id is locked.
    Started,
    /// At least one output line has arrived.
    Running,
    /// Terminal: process exited (exit code recorded).
    Done,
    /// Terminal: cancellation honored by the remote.
    Killed,
    /// Terminal: remote reported a job failure.
    Error,
    /// Terminal: no terminal frame within the local timeout.
    TimedOut,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Started => "started",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Killed => "killed",
            JobStatus::Error => "error",
            JobStatus::TimedOut => "timed out",
        };
        f.write_str(name)
    }
}

impl JobStatus {
    /// True for the absorbing states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Done | Self::Killed | Self::Error | Self::TimedOut
        )
    }
}

/// One line of job output, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// Line text as sent by the remote.
    pub text: String,
    /// True when the line came from stderr.
    pub is_error: bool,
}

/// Terminal result of a job, resolved exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// Terminal status (`is_terminal()` always holds).
    pub status: JobStatus,
    /// Process exit code; present only for [`JobStatus::Done`].
    pub exit_code: Option<i32>,
    /// Remote error message; present only for [`JobStatus::Error`].
    pub error: Option<String>,
    /// All output lines, in the exact order the transport delivered them.
    pub lines: Vec<OutputLine>,
    /// When the command was accepted locally.
    pub created_at: DateTime<Utc>,
    /// When the job reached its terminal state.
    pub finished_at: DateTime<Utc>,
}

/// Caller-side handle for one submitted command.
///
/// Output lines stream through [`next_line`](Self::next_line) as they
/// arrive; [`outcome`](Self::outcome) resolves exactly once when the job
/// reaches a terminal state. The outcome also carries the full ordered
/// line list, so consumers may ignore the stream entirely.
#[derive(Debug)]
pub struct JobHandle {
    lines: mpsc::UnboundedReceiver<OutputLine>,
    outcome: oneshot::Receiver<JobOutcome>,
}

impl JobHandle {
    /// Next streamed output line; `None` once the job has retired.
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        self.lines.recv().await
    }

    /// Wait for the terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] if the engine was torn down before
    /// the job could retire.
    pub async fn outcome(self) -> Result<JobOutcome, EngineError> {
        self.outcome.await.map_err(|_| EngineError::Closed)
    }
}

/// Engine-side senders paired with a [`JobHandle`].
#[derive(Debug)]
pub(crate) struct JobFeed {
    lines_tx: mpsc::UnboundedSender<OutputLine>,
    outcome_tx: oneshot::Sender<JobOutcome>,
}

/// Create a connected handle/feed pair for one job.
pub(crate) fn job_channel() -> (JobHandle, JobFeed) {
    let (lines_tx, lines_rx) = mpsc::unbounded_channel();
    let (outcome_tx, outcome_rx) = oneshot::channel();
    (
        JobHandle {
            lines: lines_rx,
            outcome: outcome_rx,
        },
        JobFeed {
            lines_tx,
            outcome_tx,
        },
    )
}

/// What applying a frame did to the active job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameDisposition {
    /// Frame applied; job still active.
    Applied,
    /// Frame retired the job; the slot is free and its timer must be
    /// cancelled by the caller.
    Terminal,
    /// Frame did not belong to the active job and was discarded.
    Stale,
}

#[derive(Debug)]
struct ActiveJob {
    command: String,
    job_id: Option<String>,
    status: JobStatus,
    lines: Vec<OutputLine>,
    created_at: DateTime<Utc>,
    lines_tx: mpsc::UnboundedSender<OutputLine>,
    outcome_tx: Option<oneshot::Sender<JobOutcome>>,
}

/// The single-slot job controller.
#[derive(Debug, Default)]
pub(crate) struct JobController {
    active: Option<ActiveJob>,
}

impl JobController {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// True while a job occupies the slot.
    pub(crate) fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Locked job id of the active job, once the started ack arrived.
    pub(crate) fn active_job_id(&self) -> Option<&str> {
        self.active.as_ref()?.job_id.as_deref()
    }

    /// Occupy the slot with a freshly accepted command.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Busy`] if a job is already active. The busy
    /// check happens before any socket interaction — the caller must not
    /// have sent anything yet.
    pub(crate) fn submit(&mut self, command: String, feed: JobFeed) -> Result<(), EngineError> {
        if self.active.is_some() {
            return Err(EngineError::Busy);
        }
        self.active = Some(ActiveJob {
            command,
            job_id: None,
            status: JobStatus::Pending,
            lines: Vec::new(),
            created_at: Utc::now(),
            lines_tx: feed.lines_tx,
            outcome_tx: Some(feed.outcome_tx),
        });
        Ok(())
    }

    /// Free the slot without an outcome.
    ///
    /// Used when the `run` frame could not be written: the caller never
    /// received the handle, so there is nothing to resolve.
    pub(crate) fn abort_submit(&mut self) {
        self.active = None;
    }

    /// Apply one job-scoped inbound frame.
    ///
    /// Connection-scoped frames are never routed here; they count as stale
    /// if they arrive anyway.
    pub(crate) fn on_frame(&mut self, frame: InboundFrame) -> FrameDisposition {
        match frame {
            InboundFrame::JobStarted { job_id, command } => self.on_started(job_id, &command),
            InboundFrame::JobOutput {
                job_id,
                line,
                is_error,
            } => self.on_output(&job_id, line, is_error),
            InboundFrame::JobDone { job_id, exit_code } => {
                self.on_terminal(&job_id, JobStatus::Done, Some(exit_code), None)
            }
            InboundFrame::JobKilled { job_id } => {
                self.on_terminal(&job_id, JobStatus::Killed, None, None)
            }
            InboundFrame::JobError { job_id, error } => {
                self.on_terminal(&job_id, JobStatus::Error, None, Some(error))
            }
            InboundFrame::ConnectionAck { .. } | InboundFrame::ConnectionError { .. } => {
                FrameDisposition::Stale
            }
        }
    }

    fn on_started(&mut self, job_id: String, command: &str) -> FrameDisposition {
        let Some(job) = self.active.as_mut() else {
            return FrameDisposition::Stale;
        };
        if job.job_id.is_none() && job.command == command {
            // Pending cell consumed: the id is authoritative from here on.
            log::debug!("job correlated: {} -> {job_id}", job.command);
            job.job_id = Some(job_id);
            job.status = JobStatus::Started;
            FrameDisposition::Applied
        } else if job.job_id.as_deref() == Some(job_id.as_str()) {
            // Duplicate started for the locked id; nothing to do.
            FrameDisposition::Applied
        } else {
            FrameDisposition::Stale
        }
    }

    fn on_output(&mut self, job_id: &str, text: String, is_error: bool) -> FrameDisposition {
        let Some(job) = self.active.as_mut() else {
            return FrameDisposition::Stale;
        };
        if job.job_id.as_deref() != Some(job_id) {
            return FrameDisposition::Stale;
        }
        if matches!(job.status, JobStatus::Pending | JobStatus::Started) {
            job.status = JobStatus::Running;
        }
        let line = OutputLine { text, is_error };
        job.lines.push(line.clone());
        // Receiver may be gone if the caller dropped the handle; the
        // collected outcome still records every line.
        let _ = job.lines_tx.send(line);
        FrameDisposition::Applied
    }

    fn on_terminal(
        &mut self,
        job_id: &str,
        status: JobStatus,
        exit_code: Option<i32>,
        error: Option<String>,
    ) -> FrameDisposition {
        let matches = self
            .active
            .as_ref()
            .is_some_and(|job| job.job_id.as_deref() == Some(job_id));
        if !matches {
            return FrameDisposition::Stale;
        }
        self.retire(status, exit_code, error);
        FrameDisposition::Terminal
    }

    /// Retire the active job as timed out.
    ///
    /// Returns the locked job id, if known, so the engine can send a
    /// best-effort kill to the remote.
    pub(crate) fn on_timeout(&mut self) -> Option<String> {
        self.active.as_ref()?;
        let job_id = self
            .active
            .as_ref()
            .and_then(|job| job.job_id.clone());
        self.retire(JobStatus::TimedOut, None, None);
        job_id
    }

    fn retire(&mut self, status: JobStatus, exit_code: Option<i32>, error: Option<String>) {
        debug_assert!(status.is_terminal());
        let Some(mut job) = self.active.take() else {
            return;
        };
        let outcome = JobOutcome {
            status,
            exit_code,
            error,
            lines: std::mem::take(&mut job.lines),
            created_at: job.created_at,
            finished_at: Utc::now(),
        };
        log::info!(
            "job retired: {:?} (id: {:?}, {} lines)",
            status,
            job.job_id,
            outcome.lines.len()
        );
        if let Some(tx) = job.outcome_tx.take() {
            // Caller may have dropped the handle; retirement still frees
            // the slot.
            let _ = tx.send(outcome);
        }
        // Dropping job.lines_tx here ends the caller's line stream.
    }
}
