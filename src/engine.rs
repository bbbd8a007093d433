//! The serialized dispatch path.
//!
//! One spawned task owns everything mutable: the socket halves, the
//! connection status, the reconnect accounting, the single job slot, and
//! both timer deadlines. The facade talks to it exclusively through an
//! [`EngineRequest`] inbox, so every state transition — connection or job —
//! is applied by this one `select!` loop in arrival order. Nothing here is
//! shared behind a lock.
//!
//! # Timers
//!
//! The reconnect delay and the job timeout are `Option<Instant>` deadlines
//! owned by the loop. Clearing the option *is* cancelling the timer: a
//! `None` deadline parks its select arm on a pending future, so a stale
//! timer can never fire against a reset connection or a freed job slot.
//!
//! # Connection loss policy
//!
//! A dropped socket does not fail the in-flight job. The job survives the
//! reconnect window and is retired only by a late authoritative frame or
//! by its own timeout.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};

use crate::config::Config;
use crate::connection::{ConnectionState, ConnectionStatus, ReconnectDecision, ReconnectPolicy};
use crate::error::EngineError;
use crate::job::{job_channel, FrameDisposition, JobController, JobHandle};
use crate::protocol::{self, InboundFrame, OutboundFrame};
use crate::ws::{self, WsMessage, WsReader, WsWriter};

/// Request from the facade to the engine task.
#[derive(Debug)]
pub(crate) enum EngineRequest {
    /// Open the socket. No-op while Connected or Connecting.
    Connect,
    /// Close the socket deterministically and cancel pending retries.
    Disconnect,
    /// Disconnect, then connect fresh after the short fixed delay.
    ForceReconnect,
    /// Submit a command for execution.
    Submit {
        /// Command text.
        command: String,
        /// Resolved with the job handle, or the rejection reason.
        reply: oneshot::Sender<Result<JobHandle, EngineError>>,
    },
    /// Request cancellation of the active job (advisory).
    Kill,
    /// Query the remote for the active job's status (observational).
    CheckStatus,
    /// Report whether the job slot is occupied.
    IsBusy {
        /// Resolved with the busy flag.
        reply: oneshot::Sender<bool>,
    },
}

/// What one iteration of the dispatch loop woke up for.
enum Tick {
    Request(Option<EngineRequest>),
    Socket(Option<anyhow::Result<WsMessage>>),
    RetryDue,
    JobDeadline,
}

#[derive(Debug)]
struct Engine {
    config: Config,
    status_tx: watch::Sender<ConnectionStatus>,
    writer: Option<WsWriter>,
    reader: Option<WsReader>,
    policy: ReconnectPolicy,
    /// Pending automatic or forced reconnect. `None` = timer cancelled.
    retry_at: Option<Instant>,
    jobs: JobController,
    /// Active job's execution deadline. `None` = timer cancelled.
    job_deadline: Option<Instant>,
}

/// Run the engine until the request inbox closes (facade dropped).
pub(crate) async fn run(
    config: Config,
    status_tx: watch::Sender<ConnectionStatus>,
    mut inbox: mpsc::UnboundedReceiver<EngineRequest>,
) {
    let policy = ReconnectPolicy::new(config.max_reconnect_attempts, config.reconnect_delay());
    let mut engine = Engine {
        config,
        status_tx,
        writer: None,
        reader: None,
        policy,
        retry_at: None,
        jobs: JobController::new(),
        job_deadline: None,
    };

    loop {
        let tick = tokio::select! {
            req = inbox.recv() => Tick::Request(req),
            msg = next_socket(&mut engine.reader) => Tick::Socket(msg),
            () = sleep_until_opt(engine.retry_at) => Tick::RetryDue,
            () = sleep_until_opt(engine.job_deadline) => Tick::JobDeadline,
        };

        match tick {
            Tick::Request(None) => break,
            Tick::Request(Some(req)) => engine.handle_request(req).await,
            Tick::Socket(msg) => engine.handle_socket(msg).await,
            Tick::RetryDue => {
                engine.retry_at = None;
                engine.open_socket().await;
            }
            Tick::JobDeadline => {
                engine.job_deadline = None;
                engine.handle_job_timeout().await;
            }
        }
    }

    engine.teardown().await;
}

/// Next socket message, or park forever while no socket is attached.
async fn next_socket(reader: &mut Option<WsReader>) -> Option<anyhow::Result<WsMessage>> {
    match reader.as_mut() {
        Some(r) => r.recv().await,
        None => std::future::pending().await,
    }
}

/// Sleep until the deadline, or park forever when the timer is cancelled.
async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Engine {
    fn state(&self) -> ConnectionState {
        self.status_tx.borrow().state.clone()
    }

    /// Publish a state change, maintaining the session-id invariant:
    /// the session survives Reconnecting (it was assigned by a host we may
    /// resume talking to) but never Disconnected, Connecting, or Failed.
    fn set_state(&self, state: ConnectionState) {
        self.status_tx.send_modify(|status| {
            match &state {
                ConnectionState::Disconnected
                | ConnectionState::Connecting
                | ConnectionState::Failed { .. } => status.session_id = None,
                ConnectionState::Connected | ConnectionState::Reconnecting { .. } => {}
            }
            if let ConnectionState::Failed { error } = &state {
                status.last_error = Some(error.clone());
            }
            status.state = state;
        });
    }

    async fn handle_request(&mut self, req: EngineRequest) {
        match req {
            EngineRequest::Connect => {
                if matches!(
                    self.state(),
                    ConnectionState::Connected | ConnectionState::Connecting
                ) {
                    log::debug!("connect: already connected");
                    return;
                }
                // Manual recovery action: cancel any scheduled retry and
                // restore the full attempt budget.
                self.retry_at = None;
                self.policy.reset();
                self.open_socket().await;
            }
            EngineRequest::Disconnect => {
                self.close_socket().await;
                self.policy.reset();
                self.set_state(ConnectionState::Disconnected);
                log::info!("disconnected");
            }
            EngineRequest::ForceReconnect => {
                self.close_socket().await;
                self.policy.reset();
                self.set_state(ConnectionState::Disconnected);
                self.retry_at = Some(Instant::now() + self.config.force_reconnect_delay());
                log::info!(
                    "forced reconnect in {:?}",
                    self.config.force_reconnect_delay()
                );
            }
            EngineRequest::Submit { command, reply } => {
                let result = self.submit(command).await;
                let _ = reply.send(result);
            }
            EngineRequest::Kill => self.kill().await,
            EngineRequest::CheckStatus => self.check_status().await,
            EngineRequest::IsBusy { reply } => {
                let _ = reply.send(self.jobs.is_busy());
            }
        }
    }

    /// Open the socket, converting a failed attempt into the reconnect
    /// schedule.
    async fn open_socket(&mut self) {
        let url = ws::http_to_ws_scheme(&self.config.server_url);
        self.set_state(ConnectionState::Connecting);
        log::info!("connecting to {url}");

        match time::timeout(self.config.connect_timeout(), ws::connect(&url)).await {
            Ok(Ok((writer, reader))) => {
                self.writer = Some(writer);
                self.reader = Some(reader);
                self.policy.reset();
                self.set_state(ConnectionState::Connected);
                log::info!("connected to {url}");
            }
            Ok(Err(e)) => {
                log::warn!("connect failed: {e:#}");
                self.socket_lost();
            }
            Err(_) => {
                log::warn!(
                    "connect timed out after {:?}",
                    self.config.connect_timeout()
                );
                self.socket_lost();
            }
        }
    }

    /// Deterministic close for explicit disconnect/force-reconnect. Always
    /// cancels the pending reconnect timer so a stale retry cannot fire
    /// against the reset connection.
    async fn close_socket(&mut self) {
        self.retry_at = None;
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.close().await;
        }
        self.reader = None;
    }

    /// Unexpected close or failed open attempt. The in-flight job is left
    /// alone; its own timeout is the backstop.
    fn socket_lost(&mut self) {
        self.writer = None;
        self.reader = None;
        match self.policy.on_failure() {
            ReconnectDecision::Retry { attempt } => {
                log::warn!(
                    "connection lost, retry {attempt}/{} in {:?}",
                    self.config.max_reconnect_attempts,
                    self.policy.delay()
                );
                self.set_state(ConnectionState::Reconnecting { attempt });
                self.retry_at = Some(Instant::now() + self.policy.delay());
            }
            ReconnectDecision::GiveUp => {
                log::error!(
                    "giving up after {} reconnect attempts",
                    self.config.max_reconnect_attempts
                );
                self.retry_at = None;
                self.set_state(ConnectionState::Failed {
                    error: EngineError::MaxReconnectAttemptsReached.to_string(),
                });
            }
        }
    }

    async fn submit(&mut self, command: String) -> Result<JobHandle, EngineError> {
        // Busy check first: a rejected second command sends zero frames.
        if self.jobs.is_busy() {
            log::warn!("submit rejected: a job is already running");
            return Err(EngineError::Busy);
        }
        if self.writer.is_none() {
            log::warn!("submit rejected: not connected");
            return Err(EngineError::NotConnected);
        }

        let (handle, feed) = job_channel();
        self.jobs.submit(command.clone(), feed)?;
        if let Err(e) = self.send_frame(&OutboundFrame::Run { command }).await {
            // The handle was never handed out; free the slot silently.
            self.jobs.abort_submit();
            self.socket_lost();
            return Err(e);
        }
        self.job_deadline = Some(Instant::now() + self.config.job_timeout());
        Ok(handle)
    }

    /// Advisory cancellation. Never frees the slot — only an authoritative
    /// terminal frame or the timeout does that.
    async fn kill(&mut self) {
        let Some(job_id) = self.jobs.active_job_id().map(str::to_string) else {
            log::debug!("kill: no correlated job");
            return;
        };
        if let Err(e) = self.send_frame(&OutboundFrame::Kill { job_id }).await {
            log::warn!("kill request not sent: {e}");
        }
    }

    async fn check_status(&mut self) {
        let Some(job_id) = self.jobs.active_job_id().map(str::to_string) else {
            log::debug!("check_status: no correlated job");
            return;
        };
        if let Err(e) = self.send_frame(&OutboundFrame::Status { job_id }).await {
            log::warn!("status query not sent: {e}");
        }
    }

    async fn send_frame(&mut self, frame: &OutboundFrame) -> Result<(), EngineError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(EngineError::NotConnected);
        };
        writer.send_text(&frame.to_wire()).await.map_err(|e| {
            log::warn!("frame send failed: {e:#}");
            EngineError::ConnectionLost
        })
    }

    async fn handle_socket(&mut self, msg: Option<anyhow::Result<WsMessage>>) {
        match msg {
            Some(Ok(WsMessage::Text(text))) => self.route_frame(&text),
            Some(Ok(WsMessage::Ping(data))) => {
                if let Some(writer) = self.writer.as_mut() {
                    let _ = writer.send_pong(data).await;
                }
            }
            Some(Ok(WsMessage::Pong(_))) => {}
            Some(Ok(WsMessage::Binary(data))) => {
                log::debug!("dropping unexpected binary frame ({} bytes)", data.len());
            }
            Some(Ok(WsMessage::Close { code, reason })) => {
                log::warn!("server closed the socket ({code}: {reason})");
                self.socket_lost();
            }
            Some(Err(e)) => {
                log::warn!("socket error: {e:#}");
                self.socket_lost();
            }
            None => {
                log::warn!("socket stream ended");
                self.socket_lost();
            }
        }
    }

    /// Parse and route one inbound text payload. Malformed payloads are
    /// dropped here and never reach a job or the facade.
    fn route_frame(&mut self, text: &str) {
        let frame = match protocol::parse_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("{e}; payload dropped");
                return;
            }
        };

        match frame {
            InboundFrame::ConnectionAck { session_id } => {
                log::info!("session established: {session_id}");
                self.status_tx.send_modify(|status| {
                    status.session_id = Some(session_id);
                    status.last_error = None;
                });
            }
            InboundFrame::ConnectionError { error } => {
                log::warn!("connection-level error from remote: {error}");
                self.status_tx
                    .send_modify(|status| status.last_error = Some(error));
            }
            job_frame => match self.jobs.on_frame(job_frame) {
                FrameDisposition::Terminal => {
                    // Slot freed by an authoritative frame; cancel the
                    // job timer.
                    self.job_deadline = None;
                }
                FrameDisposition::Stale => {
                    log::debug!("discarded stale job frame");
                }
                FrameDisposition::Applied => {}
            },
        }
    }

    async fn handle_job_timeout(&mut self) {
        log::warn!(
            "job exceeded {:?} without a terminal frame",
            self.config.job_timeout()
        );
        if let Some(job_id) = self.jobs.on_timeout() {
            // Best-effort: ask the remote to stop a job we already retired.
            if let Err(e) = self.send_frame(&OutboundFrame::Kill { job_id }).await {
                log::debug!("post-timeout kill not sent: {e}");
            }
        }
    }

    async fn teardown(&mut self) {
        self.retry_at = None;
        self.job_deadline = None;
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.close().await;
        }
        self.reader = None;
        self.set_state(ConnectionState::Disconnected);
        log::debug!("engine task exiting");
    }
}
