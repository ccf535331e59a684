//! # Sink connector: initial connection under a retry budget.
//!
//! [`SinkConnector::connect`] makes at most `retries` attempts to reach the
//! forwarding endpoint. Between failed attempts it sleeps a jittered,
//! growing delay and writes a notice to stderr. Once the budget is spent the
//! connector stays exhausted for the lifetime of the process.
//!
//! ```text
//! attempt 1 ──✗──► sleep(backoff.next(0)) ──► attempt 2 ──✗──► ... ──► attempt B ──✗──► SinkUnavailable
//!     └──✓──► Conn
//! ```
//!
//! ## Rules
//! - The remaining budget only goes down.
//! - Every retry sleep yields to the process cancellation token.
//! - The budget governs startup only; reconnects afterwards belong to the
//!   [`Forwarder`](crate::sink::Forwarder).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::ForwardConfig;
use crate::error::{RuntimeError, SinkError};
use crate::events::{Bus, Event, EventKind};
use crate::output::{OutputLine, OutputTx};
use crate::policies::BackoffPolicy;

/// Opens transport connections to the forwarding endpoint.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// Connection type produced by this dialer.
    type Conn: AsyncWrite + Send + Unpin + 'static;

    /// Opens one connection to `address`.
    async fn dial(&self, address: &str) -> Result<Self::Conn, SinkError>;
}

/// Plain TCP dialer with a connect deadline.
#[derive(Clone, Debug)]
pub struct TcpDialer {
    connect_timeout: Duration,
}

impl TcpDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Conn = TcpStream;

    async fn dial(&self, address: &str) -> Result<TcpStream, SinkError> {
        let stream = match timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(SinkError::Connect {
                    address: address.to_owned(),
                    source,
                });
            }
            Err(_) => {
                return Err(SinkError::Timeout {
                    timeout: self.connect_timeout,
                });
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(
                address,
                error = %e,
                "failed to set TCP_NODELAY, continuing with default buffering"
            );
        }
        Ok(stream)
    }
}

/// Startup connector for the forwarding sink.
pub struct SinkConnector<D: Dialer> {
    address: String,
    budget: u32,
    remaining: u32,
    backoff: BackoffPolicy,
    dialer: Arc<D>,
    bus: Bus,
    notices: Option<OutputTx>,
}

impl SinkConnector<TcpDialer> {
    /// Connector over plain TCP using `cfg`.
    pub fn tcp(cfg: &ForwardConfig, bus: Bus) -> Self {
        Self::new(cfg, TcpDialer::new(cfg.connect_timeout), bus)
    }
}

impl<D: Dialer> SinkConnector<D> {
    pub fn new(cfg: &ForwardConfig, dialer: D, bus: Bus) -> Self {
        let budget = cfg.retries_clamped();
        Self {
            address: cfg.address.clone(),
            budget,
            remaining: budget,
            backoff: cfg.backoff,
            dialer: Arc::new(dialer),
            bus,
            notices: None,
        }
    }

    /// Routes retry notices to the stderr lane of `out`.
    #[must_use]
    pub fn with_notices(mut self, out: OutputTx) -> Self {
        self.notices = Some(out);
        self
    }

    /// Attempts left in the budget.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Shared dialer, reused by the forwarder for reconnects.
    pub fn dialer(&self) -> Arc<D> {
        Arc::clone(&self.dialer)
    }

    /// Connects within the remaining budget.
    ///
    /// Returns `Ok(None)` if `cancel` fires first and
    /// [`RuntimeError::SinkUnavailable`] once the budget is spent.
    pub async fn connect(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<D::Conn>, RuntimeError> {
        let mut last_error = String::from("retry budget already exhausted");

        while self.remaining > 0 {
            let failed_before = self.budget - self.remaining;
            let attempt = failed_before + 1;

            let dialed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                res = self.dialer.dial(&self.address) => res,
            };

            let err = match dialed {
                Ok(conn) => {
                    tracing::info!(address = %self.address, attempt, "connected to forwarding endpoint");
                    self.bus.publish(
                        Event::new(EventKind::SinkConnected)
                            .with_target(self.address.as_str())
                            .with_attempt(attempt),
                    );
                    return Ok(Some(conn));
                }
                Err(err) => err,
            };

            self.remaining -= 1;
            last_error = err.to_string();
            if self.remaining == 0 {
                break;
            }

            let delay = self.backoff.next(failed_before);
            self.bus.publish(
                Event::new(EventKind::SinkRetryScheduled)
                    .with_target(self.address.as_str())
                    .with_attempt(attempt)
                    .with_delay(delay)
                    .with_remaining(self.remaining)
                    .with_reason(err.as_label()),
            );
            self.notify(retry_notice(delay, self.remaining)).await;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.bus.publish(
            Event::new(EventKind::SinkExhausted)
                .with_target(self.address.as_str())
                .with_attempt(self.budget)
                .with_reason(last_error.as_str()),
        );
        Err(RuntimeError::SinkUnavailable {
            attempts: self.budget,
            last_error,
        })
    }

    async fn notify(&self, text: String) {
        match &self.notices {
            Some(out) => {
                let _ = out.send(OutputLine::stderr(text, None)).await;
            }
            None => eprintln!("{text}"),
        }
    }
}

fn retry_notice(delay: Duration, remaining: u32) -> String {
    format!(
        "{} Could not connect to forwarding endpoint, next retry in {:.1?}. {} retries left.",
        chrono::Local::now().format("%Y/%m/%d %H:%M:%S"),
        delay,
        remaining
    )
}
