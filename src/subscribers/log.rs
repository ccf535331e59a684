//! # LogWriter: runtime events as `tracing` records
//!
//! Translates [`Event`]s into structured `tracing` records so hosts get runtime
//! diagnostics through whatever subscriber they install.
//!
//! ## Levels
//! ```text
//! debug  tail_starting / tail_active / duplicate_ignored / partition_started
//! info   tail_closed / tail_replaced / tail_removed / barrier_reached / since_reset
//!        shutdown_requested / sink_connected
//! warn   tail_open_failed / partition_restart_requested / sink_retry_scheduled
//!        sink_send_failed / subscriber_overflow
//! error  sink_exhausted / subscriber_panicked
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber backed by `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let subject = e.target.as_deref().unwrap_or("");
        let reason = e.reason.as_deref().unwrap_or("");
        let partition = e.partition.as_deref().unwrap_or("");

        match e.kind {
            EventKind::TailStarting => tracing::debug!(seq = e.seq, subject, "tail starting"),
            EventKind::TailActive => tracing::debug!(seq = e.seq, subject, "tail active"),
            EventKind::DuplicateIgnored => {
                tracing::debug!(seq = e.seq, subject, "duplicate add ignored")
            }
            EventKind::PartitionStarted => {
                tracing::debug!(seq = e.seq, partition, "partition watch established")
            }
            EventKind::TailClosed => tracing::info!(seq = e.seq, subject, reason, "tail closed"),
            EventKind::TailReplaced => {
                tracing::info!(seq = e.seq, subject, "closed tail replaced")
            }
            EventKind::TailRemoved => tracing::info!(seq = e.seq, subject, reason, "tail removed"),
            EventKind::BarrierReached => {
                tracing::info!(seq = e.seq, "all partitions terminated, draining")
            }
            EventKind::SinceReset => {
                tracing::info!(seq = e.seq, since_ms = e.delay_ms, "since window reset")
            }
            EventKind::ShutdownRequested => tracing::info!(seq = e.seq, "shutdown requested"),
            EventKind::SinkConnected => {
                tracing::info!(seq = e.seq, subject, attempt = e.attempt, "sink connected")
            }
            EventKind::TailOpenFailed => {
                tracing::warn!(seq = e.seq, subject, reason, "tail open failed")
            }
            EventKind::PartitionRestartRequested => tracing::warn!(
                seq = e.seq,
                partition,
                remaining = e.remaining,
                "membership feed terminated"
            ),
            EventKind::SinkRetryScheduled => tracing::warn!(
                seq = e.seq,
                subject,
                attempt = e.attempt,
                delay_ms = e.delay_ms,
                remaining = e.remaining,
                reason,
                "sink connect failed, retry scheduled"
            ),
            EventKind::SinkSendFailed => {
                tracing::warn!(seq = e.seq, subject, reason, "sink message dropped")
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(seq = e.seq, subscriber = subject, reason, "subscriber overflow")
            }
            EventKind::SinkExhausted => tracing::error!(
                seq = e.seq,
                subject,
                attempts = e.attempt,
                reason,
                "sink retry budget exhausted"
            ),
            EventKind::SubscriberPanicked => {
                tracing::error!(seq = e.seq, subscriber = subject, reason, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
