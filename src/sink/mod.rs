//! # Forwarding sink.
//!
//! Optional downstream delivery of log lines as GELF over TCP.
//!
//! - [`SinkConnector`] establishes the first connection under a retry budget.
//! - [`Forwarder`] owns the connection afterwards and drains [`ForwardRecord`]s.
//! - [`GelfMessage`] is the wire record.
//!
//! ```text
//! Supervisor ──► SinkConnector::connect ──► Conn ──► Forwarder::run
//!                      (budget, backoff)              ▲
//!                                        ForwardTx ───┘ (one per worker, cloned)
//! ```

mod connector;
mod forwarder;
mod gelf;

pub use connector::{Dialer, SinkConnector, TcpDialer};
pub use forwarder::{ForwardRecord, ForwardTx, Forwarder};
pub use gelf::{GelfMessage, short_message};
