//! # Runtime events emitted by the supervisor, registries, workers and the sink.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Tail lifecycle**: worker flow (starting, active, closed, open failure)
//! - **Registry decisions**: duplicates absorbed, dead entries replaced, removals
//! - **Partition / barrier**: feed termination, barrier reached, since reset, shutdown
//! - **Sink**: connection, retries, exhaustion, dropped sends
//!
//! The [`Event`] struct carries additional metadata such as timestamps, target,
//! partition, reasons, and retry delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tailvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::SinkRetryScheduled)
//!     .with_reason("connection refused")
//!     .with_attempt(3)
//!     .with_delay(Duration::from_secs(12));
//!
//! assert_eq!(ev.kind, EventKind::SinkRetryScheduled);
//! assert_eq!(ev.reason.as_deref(), Some("connection refused"));
//! assert_eq!(ev.delay_ms, Some(12_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::platform::TargetId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `target`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `target`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Tail lifecycle events ===
    /// Worker created and inserted; start marker emitted.
    ///
    /// Sets:
    /// - `target`: target identity
    TailStarting,

    /// Log stream opened; the worker is reading.
    ///
    /// Sets:
    /// - `target`: target identity
    TailActive,

    /// Log stream could not be opened; worker is inactive.
    ///
    /// Sets:
    /// - `target`: target identity
    /// - `reason`: platform error
    TailOpenFailed,

    /// Worker read loop exited and state settled to `Closed`.
    ///
    /// Sets:
    /// - `target`: target identity
    /// - `reason`: exit cause ("eof", "closed", read error)
    TailClosed,

    // === Registry decisions ===
    /// Added event for a live identity absorbed as a no-op.
    ///
    /// Sets:
    /// - `target`: target identity
    DuplicateIgnored,

    /// Closed entry evicted to make room for a fresh worker.
    ///
    /// Sets:
    /// - `target`: target identity
    TailReplaced,

    /// Entry evicted and its worker asked to close.
    ///
    /// Sets:
    /// - `target`: target identity
    /// - `reason`: "removed" or "drained"
    TailRemoved,

    // === Partition / barrier events ===
    /// Membership feed for a partition is established.
    ///
    /// Sets:
    /// - `partition`: namespace (`""` = all)
    PartitionStarted,

    /// Membership feed terminated; the partition reported to the barrier.
    ///
    /// Sets:
    /// - `partition`: namespace
    /// - `remaining`: partitions still live in this cycle
    PartitionRestartRequested,

    /// Every partition reported; draining all registries.
    ///
    /// Sets:
    /// - `remaining`: 0
    BarrierReached,

    /// Since-window reset before re-establishing partitions.
    ///
    /// Sets:
    /// - `delay_ms`: new since-window in milliseconds
    SinceReset,

    /// Process cancellation observed.
    ShutdownRequested,

    // === Sink events ===
    /// Forwarding connection established.
    ///
    /// Sets:
    /// - `target`: endpoint address
    /// - `attempt`: attempt number
    SinkConnected,

    /// Connection attempt failed; next attempt scheduled.
    ///
    /// Sets:
    /// - `target`: endpoint address
    /// - `attempt`: failed attempt number
    /// - `delay_ms`: delay before the next attempt
    /// - `remaining`: retries left
    /// - `reason`: connect error
    SinkRetryScheduled,

    /// Startup retry budget exhausted.
    ///
    /// Sets:
    /// - `target`: endpoint address
    /// - `attempt`: attempts made
    /// - `reason`: last connect error
    SinkExhausted,

    /// One message could not be delivered and was dropped.
    ///
    /// Sets:
    /// - `target`: target identity of the record
    /// - `reason`: send error
    SinkSendFailed,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Target identity, endpoint or subscriber name.
    pub target: Option<Arc<str>>,
    /// Partition namespace.
    pub partition: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Remaining budget/partitions.
    pub remaining: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            target: None,
            partition: None,
            reason: None,
            attempt: None,
            delay_ms: None,
            remaining: None,
        }
    }

    /// Creates a tail event for `id`.
    #[inline]
    pub fn tail(kind: EventKind, id: &TargetId) -> Self {
        Self::new(kind).with_target(id.to_string())
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a target name.
    #[inline]
    pub fn with_target(mut self, target: impl Into<Arc<str>>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Attaches a partition namespace.
    #[inline]
    pub fn with_partition(mut self, ns: impl Into<Arc<str>>) -> Self {
        self.partition = Some(ns.into());
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a remaining count.
    #[inline]
    pub fn with_remaining(mut self, n: u32) -> Self {
        self.remaining = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_target(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_target(subscriber)
            .with_reason(info)
    }
}
