//! # tailvisor
//!
//! **Tailvisor** follows the logs of many containers at once. It watches pod
//! membership in one or more namespaces, keeps exactly one tail worker per
//! `(namespace, pod, container)` and merges every worker's lines into a single
//! output, either the console or a GELF forwarding endpoint.
//!
//! The cluster itself is behind the [`Platform`] trait; the crate holds the
//! concurrency and lifecycle logic.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!            ┌────────────────────────────────────────────────────────────┐
//!            │  Supervisor                                                │
//!            │  - Bus + SubscriberSet (diagnostic events)                 │
//!            │  - RestartBarrier per cycle                                │
//!            │  - optional SinkConnector ──► Forwarder                    │
//!            └──────┬─────────────────────┬──────────────────────┬────────┘
//!                   ▼                     ▼                      ▼
//!         MembershipAdapter(ns-a)  MembershipAdapter(ns-b)  ...  (one per partition)
//!                   │ Added / Removed     │
//!                   ▼                     ▼
//!           TailRegistry(ns-a)     TailRegistry(ns-b)      (≤ 1 live worker per identity)
//!              │     │                   │
//!              ▼     ▼                   ▼
//!           worker worker              worker             (follow one log stream each)
//!              │     │                   │
//!              └─────┴───────┬───────────┘
//!                            ▼
//!              Output multiplexer (bounded, backpressure)
//!                 ├─► stdout: rendered lines      (console mode)
//!                 ├─► stderr: + / - markers, diagnostics
//!                 └─► Forwarder ─► GELF/TCP        (forwarding mode)
//! ```
//!
//! ### Restart cycle
//! ```text
//! cycle 0: since = Config::since
//!   every partition feed ends ──► barrier complete ──► drain all workers
//! cycle k>0: since = Config::restart_since
//! cancellation ──► drain all workers ──► Ok(())
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                        |
//! |-------------------|----------------------------------------------------------|-------------------------------------------|
//! | **Supervision**   | Partitions, restart barrier, shutdown                    | [`Supervisor`], [`run`]                   |
//! | **Platform**      | Membership feed and log streams                          | [`Platform`], [`Target`], [`TargetId`]    |
//! | **Output**        | Templates, pod colours, multiplexing                     | [`Render`], [`TemplateRenderer`]          |
//! | **Forwarding**    | GELF over TCP with a startup retry budget                | [`ForwardConfig`], [`BackoffPolicy`]      |
//! | **Subscriber API**| Runtime events for logging and metrics                   | [`Subscribe`], [`LogWriter`], [`Event`]   |
//! | **Errors**        | Typed errors per layer                                   | [`RuntimeError`], [`PlatformError`]       |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tailvisor::{Config, Platform};
//!
//! async fn follow(platform: Arc<dyn Platform>) -> Result<(), tailvisor::RuntimeError> {
//!     let cfg = Config {
//!         namespaces: vec!["shop".into()],
//!         tail_lines: Some(10),
//!         ..Config::default()
//!     };
//!     let renderer = Arc::new(cfg.renderer().expect("valid template"));
//!     tailvisor::run(CancellationToken::new(), cfg, platform, renderer).await
//! }
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

mod config;
mod core;
mod error;
mod events;
mod output;
mod platform;
mod policies;
mod sink;
mod subscribers;
mod tail;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use config::{Config, ForwardConfig, TailOptions};
pub use core::{
    BoxWriter, FeedEnd, MembershipAdapter, RestartBarrier, Supervisor, SupervisorBuilder,
};
pub use error::{PlatformError, RenderError, RuntimeError, SinkError, TailError};
pub use events::{Bus, Event, EventKind};
pub use output::{
    Lane, LineSink, LogRecord, OutputClosed, OutputLine, OutputRx, OutputTx, Palette, PodColors,
    Render, TemplateRenderer, channel as output_channel, start_marker, stop_marker,
};
pub use platform::{
    ContainerState, LogStream, LogStreamOptions, MembershipEvent, MembershipFeed, Platform,
    Target, TargetId, WatchQuery,
};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use sink::{
    Dialer, ForwardRecord, ForwardTx, Forwarder, GelfMessage, SinkConnector, TcpDialer,
    short_message,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use tail::{AddOutcome, LineFilter, TailContext, TailHandle, TailRegistry, TailState};

/// Runs a tailing session until `token` is cancelled or a fatal error occurs.
///
/// Runtime events are logged through `tracing` by a [`LogWriter`].
pub async fn run(
    token: CancellationToken,
    config: Config,
    platform: Arc<dyn Platform>,
    renderer: Arc<dyn Render>,
) -> Result<(), RuntimeError> {
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    Supervisor::builder(config)
        .with_subscribers(subs)
        .build(platform, renderer)
        .run(token)
        .await
}

