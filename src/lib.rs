//! Execlink - remote command execution over a persistent WebSocket.
//!
//! This crate provides the client-side protocol engine for running shell
//! commands on a remote execution host: a persistent JSON-over-WebSocket
//! connection with bounded automatic reconnection, strict inbound frame
//! decoding, and a single-slot job lifecycle with streamed output.
//!
//! # Architecture
//!
//! All mutable protocol state lives inside one spawned engine task:
//!
//! - **CommandClient** - Public facade, a cheap cloneable handle
//! - **Engine** - The serialized dispatch loop, owns socket and timers
//! - **JobController** - Single job slot, correlation and retirement
//! - **ReconnectPolicy** - Fixed-delay bounded retry accounting
//!
//! # Modules
//!
//! - [`client`] - Public facade ([`CommandClient`])
//! - `engine` - Engine task and request inbox (crate-private)
//! - [`job`] - Job lifecycle, output streaming, outcomes
//! - [`protocol`] - Wire frame encode/decode
//! - [`connection`] - Connection state and reconnect policy
//! - [`ws`] - WebSocket transport halves
//! - [`config`] - Configuration loading/saving

pub mod client;
pub mod config;
pub mod connection;
pub mod constants;
mod engine;
pub mod error;
pub mod job;
pub mod protocol;
pub mod ws;

// Re-export commonly used types
pub use client::CommandClient;
pub use config::Config;
pub use connection::{ConnectionState, ConnectionStatus};
pub use error::EngineError;
pub use job::{JobHandle, JobOutcome, JobStatus, OutputLine};
