//! Wire protocol frames for the execution host.
//!
//! The host speaks JSON text frames over a persistent WebSocket. Outbound
//! frames are tagged by an `action` field; inbound frames carry no tag and
//! are discriminated by which fields are present plus the `status` value.
//!
//! Inbound classification is strict: a payload either matches exactly one
//! of the enumerated shapes or it is rejected as malformed. Callers drop
//! and log rejected payloads — they never reach a job.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Frame sent from the client to the execution host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Submit a command for execution.
    Run {
        /// Shell command text.
        command: String,
    },
    /// Request cancellation of a running job. Advisory: the job slot is
    /// freed only by an authoritative terminal frame, never by this request.
    Kill {
        /// Job to cancel.
        #[serde(rename = "jobId")]
        job_id: String,
    },
    /// Query the current status of a job. Purely observational.
    Status {
        /// Job to query.
        #[serde(rename = "jobId")]
        job_id: String,
    },
}

impl OutboundFrame {
    /// Serialize to the JSON text put on the wire.
    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).expect("outbound frame serializable")
    }
}

/// Frame received from the execution host, as a closed tagged union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Handshake complete; the remote assigned a session id.
    ConnectionAck {
        /// Opaque session identifier.
        session_id: String,
    },
    /// Job accepted; the job id is authoritative from here on.
    JobStarted {
        /// Remote-assigned job identifier.
        job_id: String,
        /// Echo of the submitted command, used for initial correlation.
        command: String,
    },
    /// One line of stdout or stderr.
    JobOutput {
        /// Job the line belongs to.
        job_id: String,
        /// Line text.
        line: String,
        /// True when the line came from stderr.
        is_error: bool,
    },
    /// Terminal: the process exited.
    JobDone {
        /// Job that finished.
        job_id: String,
        /// Process exit code.
        exit_code: i32,
    },
    /// Terminal: cancellation was honored.
    JobKilled {
        /// Job that was killed.
        job_id: String,
    },
    /// Terminal: the remote failed the job.
    JobError {
        /// Job that failed.
        job_id: String,
        /// Remote error description.
        error: String,
    },
    /// Connection-level error, not tied to any job.
    ConnectionError {
        /// Remote error description.
        error: String,
    },
}

/// Loosely-typed inbound payload, before classification.
///
/// Field names match the wire (camelCase). Unknown extra fields are
/// tolerated; classification only looks at the ones below.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    session_id: Option<String>,
    job_id: Option<String>,
    status: Option<String>,
    command: Option<String>,
    line: Option<String>,
    exit_code: Option<i32>,
    error: Option<String>,
}

/// Parse one inbound wire payload into a typed frame.
///
/// # Errors
///
/// Returns [`EngineError::MalformedFrame`] when the payload is not valid
/// JSON or does not match any of the enumerated frame shapes.
pub fn parse_frame(text: &str) -> Result<InboundFrame, EngineError> {
    let raw: RawFrame = serde_json::from_str(text)
        .map_err(|e| EngineError::MalformedFrame(format!("invalid JSON: {e}")))?;
    classify(raw)
}

fn classify(raw: RawFrame) -> Result<InboundFrame, EngineError> {
    let status = raw.status.as_deref();

    if let (Some(session_id), Some("connected")) = (raw.session_id, status) {
        return Ok(InboundFrame::ConnectionAck { session_id });
    }

    if let Some(job_id) = raw.job_id {
        return match status {
            Some("started") => match raw.command {
                Some(command) => Ok(InboundFrame::JobStarted { job_id, command }),
                None => Err(EngineError::MalformedFrame(
                    "started frame without command".into(),
                )),
            },
            Some("running") => match raw.line {
                Some(line) => Ok(InboundFrame::JobOutput {
                    job_id,
                    line,
                    is_error: false,
                }),
                None => Err(EngineError::MalformedFrame(
                    "running frame without line".into(),
                )),
            },
            // "error" with a line is a stderr output frame; with an error
            // field it is a terminal job failure.
            Some("error") => match (raw.line, raw.error) {
                (Some(line), _) => Ok(InboundFrame::JobOutput {
                    job_id,
                    line,
                    is_error: true,
                }),
                (None, Some(error)) => Ok(InboundFrame::JobError { job_id, error }),
                (None, None) => Err(EngineError::MalformedFrame(
                    "error frame without line or error".into(),
                )),
            },
            Some("done") => match raw.exit_code {
                Some(exit_code) => Ok(InboundFrame::JobDone { job_id, exit_code }),
                None => Err(EngineError::MalformedFrame(
                    "done frame without exitCode".into(),
                )),
            },
            Some("killed") => Ok(InboundFrame::JobKilled { job_id }),
            other => Err(EngineError::MalformedFrame(format!(
                "unrecognized job status {other:?}"
            ))),
        };
    }

    // No job id: only a connection-scoped error remains.
    if let Some(error) = raw.error {
        return Ok(InboundFrame::ConnectionError { error });
    }

    Err(EngineError::MalformedFrame(
        "payload matches no known frame shape".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_run_wire_format() {
        let frame = OutboundFrame::Run {
            command: "ls -la".into(),
        };
        assert_eq!(frame.to_wire(), r#"{"action":"run","command":"ls -la"}"#);
    }

    #[test]
    fn test_outbound_kill_uses_camel_case_job_id() {
        let frame = OutboundFrame::Kill {
            job_id: "j-1".into(),
        };
        assert_eq!(frame.to_wire(), r#"{"action":"kill","jobId":"j-1"}"#);
    }

    #[test]
    fn test_outbound_status_wire_format() {
        let frame = OutboundFrame::Status {
            job_id: "j-2".into(),
        };
        assert_eq!(frame.to_wire(), r#"{"action":"status","jobId":"j-2"}"#);
    }

    #[test]
    fn test_parse_connection_ack() {
        let frame =
            parse_frame(r#"{"sessionId":"abc123","status":"connected"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::ConnectionAck {
                session_id: "abc123".into()
            }
        );
    }

    #[test]
    fn test_parse_job_started() {
        let frame =
            parse_frame(r#"{"status":"started","jobId":"j-1","command":"ls"}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::JobStarted {
                job_id: "j-1".into(),
                command: "ls".into()
            }
        );
    }

    #[test]
    fn test_parse_stdout_and_stderr_output() {
        let out =
            parse_frame(r#"{"status":"running","jobId":"j-1","line":"hello"}"#).unwrap();
        assert_eq!(
            out,
            InboundFrame::JobOutput {
                job_id: "j-1".into(),
                line: "hello".into(),
                is_error: false
            }
        );

        let err =
            parse_frame(r#"{"status":"error","jobId":"j-1","line":"oops"}"#).unwrap();
        assert_eq!(
            err,
            InboundFrame::JobOutput {
                job_id: "j-1".into(),
                line: "oops".into(),
                is_error: true
            }
        );
    }

    #[test]
    fn test_parse_terminal_frames() {
        assert_eq!(
            parse_frame(r#"{"status":"done","jobId":"j-1","exitCode":0}"#).unwrap(),
            InboundFrame::JobDone {
                job_id: "j-1".into(),
                exit_code: 0
            }
        );
        assert_eq!(
            parse_frame(r#"{"status":"killed","jobId":"j-1"}"#).unwrap(),
            InboundFrame::JobKilled {
                job_id: "j-1".into()
            }
        );
        assert_eq!(
            parse_frame(r#"{"status":"error","jobId":"j-1","error":"exec failed"}"#)
                .unwrap(),
            InboundFrame::JobError {
                job_id: "j-1".into(),
                error: "exec failed".into()
            }
        );
    }

    #[test]
    fn test_parse_connection_error_has_no_job_id() {
        assert_eq!(
            parse_frame(r#"{"error":"session limit reached"}"#).unwrap(),
            InboundFrame::ConnectionError {
                error: "session limit reached".into()
            }
        );
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        assert!(matches!(
            parse_frame("not json at all"),
            Err(EngineError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_unknown_shape_is_malformed() {
        // Valid JSON, but no recognizable fields
        assert!(matches!(
            parse_frame(r#"{"foo":1,"bar":"baz"}"#),
            Err(EngineError::MalformedFrame(_))
        ));
        // Done without an exit code is rejected, not guessed at
        assert!(matches!(
            parse_frame(r#"{"status":"done","jobId":"j-1"}"#),
            Err(EngineError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_extra_fields_are_tolerated() {
        let frame = parse_frame(
            r#"{"status":"killed","jobId":"j-9","elapsed":12,"notes":"x"}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            InboundFrame::JobKilled {
                job_id: "j-9".into()
            }
        );
    }
}
