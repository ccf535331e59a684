//! # Forwarder: drains records into the forwarding connection.
//!
//! Workers in forwarding mode hand each line to a [`ForwardTx`]; one
//! [`Forwarder`] task encodes it as GELF and writes it to the endpoint.
//!
//! ```text
//! worker ──► ForwardTx::send ──► [bounded mpsc] ──► Forwarder::run ──► GELF\0 ──► conn
//!                                                        │ write error: drop message, mark broken
//!                                                        └ next message: one dial attempt
//! ```
//!
//! ## Rules
//! - The message path never sleeps. While the endpoint is down, records that
//!   arrive before the next dial is due are counted and dropped.
//! - Dials are `reconnect_delay` apart; after `max_reconnect` consecutive
//!   failures the endpoint is held down for `max_reconnect × reconnect_delay`.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ForwardConfig;
use crate::error::SinkError;
use crate::events::{Bus, Event, EventKind};
use crate::output::OutputClosed;
use crate::platform::Target;
use crate::sink::connector::Dialer;
use crate::sink::gelf::{self, GelfMessage};

/// A line plus the metadata needed to build its GELF record.
#[derive(Clone, Debug)]
pub struct ForwardRecord {
    pub target: Target,
    pub message: String,
    /// Unix seconds at which the line was read.
    pub timestamp: f64,
}

impl ForwardRecord {
    /// Record stamped with the current time.
    pub fn now(target: Target, message: String) -> Self {
        Self {
            target,
            message,
            timestamp: gelf::now_timestamp(),
        }
    }
}

/// Producer handle for the forwarder queue.
#[derive(Clone, Debug)]
pub struct ForwardTx {
    tx: mpsc::Sender<ForwardRecord>,
    shutdown: CancellationToken,
}

impl ForwardTx {
    /// Queues a record, suspending while the queue is full.
    pub async fn send(&self, record: ForwardRecord) -> Result<(), OutputClosed> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(OutputClosed),
            res = self.tx.send(record) => res.map_err(|_| OutputClosed),
        }
    }
}

/// Connection state between records.
enum Link<C> {
    Up(C),
    /// Broken; records arriving before `retry_at` are dropped without dialing.
    Down {
        failures: u32,
        retry_at: Instant,
        dropped: u64,
    },
}

impl<C> Link<C> {
    fn broken() -> Self {
        Link::Down {
            failures: 0,
            retry_at: Instant::now(),
            dropped: 0,
        }
    }
}

/// Forwarding task state.
pub struct Forwarder<D: Dialer> {
    address: String,
    host: String,
    dialer: Arc<D>,
    link: Link<D::Conn>,
    max_reconnect: u32,
    reconnect_delay: Duration,
    bus: Bus,
    rx: mpsc::Receiver<ForwardRecord>,
}

impl<D: Dialer> Forwarder<D> {
    /// Creates the forwarder over an established connection.
    ///
    /// `host` is the GELF `host` field. `shutdown` stops producers.
    pub fn new(
        cfg: &ForwardConfig,
        host: String,
        dialer: Arc<D>,
        conn: D::Conn,
        bus: Bus,
        shutdown: CancellationToken,
    ) -> (Self, ForwardTx) {
        let (tx, rx) = mpsc::channel(cfg.queue_capacity.max(1));
        let fwd = Self {
            address: cfg.address.clone(),
            host,
            dialer,
            link: Link::Up(conn),
            max_reconnect: cfg.max_reconnect,
            reconnect_delay: cfg.reconnect_delay,
            bus,
            rx,
        };
        (fwd, ForwardTx { tx, shutdown })
    }

    /// Forwards records until `cancel` fires or every producer is gone.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::debug!(address = %self.address, "forwarder started");
        loop {
            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                rec = self.rx.recv() => match rec {
                    Some(rec) => rec,
                    None => break,
                },
            };
            if self.skip_while_down() {
                continue;
            }
            if let Err(err) = self.forward(&record, &cancel).await {
                if matches!(err, SinkError::Cancelled) {
                    break;
                }
                tracing::warn!(
                    address = %self.address,
                    subject = %record.target.id(),
                    error = %err,
                    "dropping forwarded message"
                );
                self.bus.publish(
                    Event::tail(EventKind::SinkSendFailed, &record.target.id())
                        .with_reason(err.to_string()),
                );
            }
        }
        tracing::debug!(address = %self.address, "forwarder stopped");
    }

    /// Counts and drops a record if the endpoint is down and not due for a dial.
    fn skip_while_down(&mut self) -> bool {
        match &mut self.link {
            Link::Down {
                retry_at, dropped, ..
            } if Instant::now() < *retry_at => {
                *dropped += 1;
                true
            }
            _ => false,
        }
    }

    async fn forward(
        &mut self,
        record: &ForwardRecord,
        cancel: &CancellationToken,
    ) -> Result<(), SinkError> {
        let bytes = GelfMessage::new(
            &self.host,
            &record.target,
            &record.message,
            record.timestamp,
        )
        .encode()?;

        if matches!(self.link, Link::Down { .. }) {
            self.redial(cancel).await?;
        }
        let Link::Up(conn) = &mut self.link else {
            return Err(SinkError::NotConnected { attempts: 0 });
        };

        let written = async {
            conn.write_all(&bytes).await?;
            conn.flush().await
        }
        .await;
        if let Err(e) = written {
            self.link = Link::broken();
            return Err(SinkError::Write(e));
        }
        Ok(())
    }

    /// One dial attempt. Failures push the next attempt `reconnect_delay` out;
    /// after `max_reconnect` consecutive failures the endpoint is held down for
    /// `max_reconnect × reconnect_delay`.
    async fn redial(&mut self, cancel: &CancellationToken) -> Result<(), SinkError> {
        let (failures, dropped) = match &self.link {
            Link::Down {
                failures, dropped, ..
            } => (*failures, *dropped),
            Link::Up(_) => return Ok(()),
        };
        let attempt = failures + 1;

        let dialed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SinkError::Cancelled),
            res = self.dialer.dial(&self.address) => res,
        };
        match dialed {
            Ok(conn) => {
                tracing::info!(address = %self.address, attempt, dropped, "reconnected to forwarding endpoint");
                self.bus.publish(
                    Event::new(EventKind::SinkConnected)
                        .with_target(self.address.as_str())
                        .with_attempt(attempt),
                );
                self.link = Link::Up(conn);
                Ok(())
            }
            Err(e) => {
                tracing::debug!(address = %self.address, attempt, error = %e, "reconnect failed");
                let (failures, wait) = if attempt >= self.max_reconnect {
                    let hold = self.reconnect_delay.saturating_mul(self.max_reconnect.max(1));
                    tracing::warn!(
                        address = %self.address,
                        hold = ?hold,
                        "forwarding endpoint down, dropping messages"
                    );
                    (0, hold)
                } else {
                    (attempt, self.reconnect_delay)
                };
                self.link = Link::Down {
                    failures,
                    retry_at: Instant::now() + wait,
                    dropped,
                };
                Err(SinkError::NotConnected { attempts: attempt })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::io::{AsyncReadExt, DuplexStream};

    /// Hands out the queued server-side halves' peers, one per dial.
    struct QueueDialer {
        peers: Mutex<Vec<DuplexStream>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Dialer for QueueDialer {
        type Conn = DuplexStream;

        async fn dial(&self, address: &str) -> Result<DuplexStream, SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.peers.lock().ok().and_then(|mut p| p.pop());
            next.ok_or_else(|| SinkError::Connect {
                address: address.to_owned(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            })
        }
    }

    async fn read_frame(server: &mut DuplexStream) -> serde_json::Value {
        let mut buf = Vec::new();
        loop {
            let b = server.read_u8().await.expect("byte");
            if b == 0 {
                break;
            }
            buf.push(b);
        }
        serde_json::from_slice(&buf).expect("json")
    }

    fn target() -> Target {
        Target::new("shop", "cart-7d9f", "api", "node-1")
    }

    #[tokio::test]
    async fn test_forwards_gelf_frames_in_order() {
        let (client, mut server) = tokio::io::duplex(4096);
        let dialer = Arc::new(QueueDialer {
            peers: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        });
        let token = CancellationToken::new();
        let (fwd, tx) = Forwarder::new(
            &ForwardConfig::new("graylog:12201"),
            "prod-eu".into(),
            dialer,
            client,
            Bus::new(8),
            token.clone(),
        );
        let task = tokio::spawn(fwd.run(token.clone()));

        tx.send(ForwardRecord::now(target(), "first".into())).await.unwrap();
        tx.send(ForwardRecord::now(target(), "second".into())).await.unwrap();

        let a = read_frame(&mut server).await;
        let b = read_frame(&mut server).await;
        assert_eq!(a["full_message"], "first");
        assert_eq!(b["full_message"], "second");
        assert_eq!(a["host"], "prod-eu");

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_drops_message_then_reconnects() {
        let (client, server) = tokio::io::duplex(4096);
        drop(server);
        let (spare_client, mut spare_server) = tokio::io::duplex(4096);
        let dialer = Arc::new(QueueDialer {
            peers: Mutex::new(vec![spare_client]),
            calls: AtomicU32::new(0),
        });
        let bus = Bus::new(16);
        let mut events = bus.subscribe();
        let token = CancellationToken::new();
        let (fwd, tx) = Forwarder::new(
            &ForwardConfig::new("graylog:12201"),
            "prod-eu".into(),
            Arc::clone(&dialer),
            client,
            bus,
            token.clone(),
        );
        let task = tokio::spawn(fwd.run(token.clone()));

        tx.send(ForwardRecord::now(target(), "lost".into())).await.unwrap();
        tx.send(ForwardRecord::now(target(), "kept".into())).await.unwrap();

        let frame = read_frame(&mut spare_server).await;
        assert_eq!(frame["full_message"], "kept");
        assert_eq!(dialer.calls.load(Ordering::SeqCst), 1);

        let failed = loop {
            let ev = events.recv().await.unwrap();
            if ev.kind == EventKind::SinkSendFailed {
                break ev;
            }
        };
        assert_eq!(failed.target.as_deref(), Some("shop/cart-7d9f/api"));

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_down_endpoint_does_not_throttle_producers() {
        let (client, server) = tokio::io::duplex(4096);
        drop(server);
        let dialer = Arc::new(QueueDialer {
            peers: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        });
        let cfg = ForwardConfig {
            queue_capacity: 4,
            ..ForwardConfig::new("graylog:12201")
        };
        let token = CancellationToken::new();
        let (fwd, tx) = Forwarder::new(
            &cfg,
            "prod-eu".into(),
            Arc::clone(&dialer),
            client,
            Bus::new(64),
            token.clone(),
        );
        let task = tokio::spawn(fwd.run(token.clone()));

        let started = Instant::now();
        for i in 0..10 {
            tx.send(ForwardRecord::now(target(), format!("line {i}")))
                .await
                .unwrap();
        }
        assert!(started.elapsed() < cfg.reconnect_delay);
        assert!(dialer.calls.load(Ordering::SeqCst) <= 1);

        let (spare_client, mut spare_server) = tokio::io::duplex(4096);
        dialer.peers.lock().unwrap().push(spare_client);
        tokio::time::advance(cfg.reconnect_delay).await;
        tx.send(ForwardRecord::now(target(), "back".into())).await.unwrap();

        loop {
            if read_frame(&mut spare_server).await["full_message"] == "back" {
                break;
            }
        }

        token.cancel();
        task.await.unwrap();
    }
}
