//! # Output multiplexer: many producers, one writer.
//!
//! Every worker of every partition pushes [`OutputLine`]s into one bounded
//! queue; exactly one consumer drains it to the process streams.
//!
//! ## Architecture
//! ```text
//!   worker 1 ──┐
//!   worker 2 ──┼──► OutputTx::send ──► [bounded mpsc, cap C] ──► OutputRx::run
//!   worker N ──┘     (suspends when full)                         ├─► stdout (lines)
//!                                                                  └─► stderr (markers)
//! ```
//!
//! ## Rules
//! - **Backpressure**: a full queue suspends producers; nothing is dropped.
//! - **Per-producer FIFO**: lines from one worker keep their order; workers interleave.
//! - **Shutdown**: once the process token fires, `send` returns [`OutputClosed`]
//!   and the consumer stops without flushing what is still queued.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::platform::TargetId;

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Destination stream of an output line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lane {
    /// Formatted log lines.
    Stdout,
    /// Lifecycle markers and diagnostics.
    Stderr,
}

/// One formatted line in transit (no trailing newline).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLine {
    pub lane: Lane,
    pub text: String,
    /// Worker that produced the line, if any.
    pub source: Option<TargetId>,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>, source: Option<TargetId>) -> Self {
        Self {
            lane: Lane::Stdout,
            text: text.into(),
            source,
        }
    }

    pub fn stderr(text: impl Into<String>, source: Option<TargetId>) -> Self {
        Self {
            lane: Lane::Stderr,
            text: text.into(),
            source,
        }
    }
}

/// The multiplexer is shut down; the line was not queued.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("output multiplexer closed")]
pub struct OutputClosed;

/// Creates a multiplexer with `capacity` pending lines (min 1).
///
/// `shutdown` is the process-wide token; it stops both ends.
pub fn channel(capacity: usize, shutdown: CancellationToken) -> (OutputTx, OutputRx) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        OutputTx {
            tx,
            shutdown: shutdown.clone(),
        },
        OutputRx { rx, shutdown },
    )
}

/// Producer handle, cloned into every worker.
#[derive(Clone, Debug)]
pub struct OutputTx {
    tx: mpsc::Sender<OutputLine>,
    shutdown: CancellationToken,
}

impl OutputTx {
    /// Queues a line, suspending while the queue is full.
    pub async fn send(&self, line: OutputLine) -> Result<(), OutputClosed> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(OutputClosed),
            res = self.tx.send(line) => res.map_err(|_| OutputClosed),
        }
    }
}

/// The single consumer.
#[derive(Debug)]
pub struct OutputRx {
    rx: mpsc::Receiver<OutputLine>,
    shutdown: CancellationToken,
}

impl OutputRx {
    /// Takes the next line; `None` after shutdown or once every producer is gone.
    pub async fn recv(&mut self) -> Option<OutputLine> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            line = self.rx.recv() => line,
        }
    }

    /// Drains lines into `out` / `err` until shutdown.
    pub async fn run<O, E>(mut self, mut out: O, mut err: E) -> io::Result<()>
    where
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        while let Some(line) = self.recv().await {
            match line.lane {
                Lane::Stdout => write_line(&mut out, &line.text).await?,
                Lane::Stderr => write_line(&mut err, &line.text).await?,
            }
        }
        Ok(())
    }
}

async fn write_line<W: AsyncWrite + Unpin>(w: &mut W, text: &str) -> io::Result<()> {
    w.write_all(text.as_bytes()).await?;
    w.write_all(b"\n").await?;
    w.flush().await
}
