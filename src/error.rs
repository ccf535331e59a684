//! Error types used by the tailvisor runtime, tail workers and the forwarding sink.
//!
//! This module defines the error enums by blast radius:
//!
//! - [`RuntimeError`]: fatal conditions that stop [`run`](crate::run) before or while
//!   reaching a consistent running state.
//! - [`PlatformError`]: failures reported by the orchestration platform collaborator.
//! - [`TailError`]: per-target failures; isolated to one worker, never fatal.
//! - [`SinkError`]: per-send failures of the forwarding sink; logged and dropped.
//! - [`RenderError`]: template parse failures.
//!
//! Every enum provides `as_label` (stable snake_case for logs/metrics).

use std::time::Duration;
use thiserror::Error;

/// # Errors that end the process run.
///
/// Only conditions that prevent the system from reaching a consistent running
/// state are surfaced here. Steady-state faults stay inside their unit.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No namespace was configured and the platform could not resolve a default one.
    #[error("unable to get default namespace: {source}")]
    DefaultNamespace {
        /// Underlying platform failure.
        #[source]
        source: PlatformError,
    },

    /// Setting up the membership watch for a partition failed.
    #[error("failed to set up watch for namespace {namespace:?}: {source}")]
    WatchSetup {
        /// Namespace of the partition (`""` = all namespaces).
        namespace: String,
        /// Underlying platform failure.
        #[source]
        source: PlatformError,
    },

    /// The forwarding endpoint could not be reached within the retry budget.
    #[error("setup forwarding sink failed after {attempts} attempts: {last_error}")]
    SinkUnavailable {
        /// Number of connection attempts that were made.
        attempts: u32,
        /// Error returned by the last attempt.
        last_error: String,
    },

    /// Registering OS signal handlers failed.
    #[error("signal handler registration failed: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use tailvisor::RuntimeError;
    ///
    /// let err = RuntimeError::SinkUnavailable { attempts: 3, last_error: "refused".into() };
    /// assert_eq!(err.as_label(), "runtime_sink_unavailable");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::DefaultNamespace { .. } => "runtime_default_namespace",
            RuntimeError::WatchSetup { .. } => "runtime_watch_setup",
            RuntimeError::SinkUnavailable { .. } => "runtime_sink_unavailable",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}

/// # Errors reported by the orchestration platform collaborator.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    /// Client or kubeconfig construction failed.
    #[error("client setup failed: {0}")]
    Client(String),

    /// The watch request was rejected.
    #[error("watch failed: {0}")]
    Watch(String),

    /// A log stream could not be opened.
    #[error("log stream failed: {0}")]
    Stream(String),

    /// Default namespace lookup failed.
    #[error("namespace lookup failed: {0}")]
    Namespace(String),
}

impl PlatformError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PlatformError::Client(_) => "platform_client",
            PlatformError::Watch(_) => "platform_watch",
            PlatformError::Stream(_) => "platform_stream",
            PlatformError::Namespace(_) => "platform_namespace",
        }
    }
}

/// # Per-target tail failures.
///
/// A tail error marks the worker inactive; the only retry path is a fresh
/// `Added` event for the same identity.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TailError {
    /// Opening the follow-mode log stream failed.
    #[error("Error opening stream to {namespace}/{pod}: {container}: {source}")]
    StreamOpen {
        /// Namespace of the target.
        namespace: String,
        /// Workload (pod) name.
        pod: String,
        /// Container name.
        container: String,
        /// Underlying platform failure.
        #[source]
        source: PlatformError,
    },

    /// Reading from an open stream failed.
    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),
}

impl TailError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TailError::StreamOpen { .. } => "tail_stream_open",
            TailError::Read(_) => "tail_read",
        }
    }
}

/// # Forwarding sink failures.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SinkError {
    /// Connecting to the endpoint failed.
    #[error("connection failed to {address}: {source}")]
    Connect {
        /// Endpoint address (`host:port`).
        address: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Writing a message failed.
    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),

    /// Encoding a message failed.
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// No live connection and reconnecting did not succeed.
    #[error("not connected after {attempts} reconnect attempts")]
    NotConnected {
        /// Consecutive failed reconnect attempts.
        attempts: u32,
    },

    /// The process is shutting down.
    #[error("cancelled")]
    Cancelled,

    /// A connect or write exceeded its deadline.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },
}

impl SinkError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SinkError::Connect { .. } => "sink_connect",
            SinkError::Write(_) => "sink_write",
            SinkError::Encode(_) => "sink_encode",
            SinkError::NotConnected { .. } => "sink_not_connected",
            SinkError::Cancelled => "sink_cancelled",
            SinkError::Timeout { .. } => "sink_timeout",
        }
    }
}

/// # Template errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The template references a field that does not exist on a log record.
    #[error("unknown template field {0:?}")]
    UnknownField(String),

    /// A `{` was opened but never closed.
    #[error("unterminated placeholder at byte {0}")]
    Unterminated(usize),
}
