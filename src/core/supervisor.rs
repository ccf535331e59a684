//! # Supervisor: drives run cycles across namespace partitions.
//!
//! The [`Supervisor`] owns the event bus, the [`SubscriberSet`], the output
//! multiplexer and (optionally) the forwarding sink. It runs the watch
//! machinery in **cycles**: one [`MembershipAdapter`] and one [`TailRegistry`]
//! per partition, restarted together whenever every partition's feed has ended.
//!
//! ## High-level architecture
//! ```text
//! run(token):
//!   subscriber_listener(): Bus ──► SubscriberSet::emit
//!   output consumer:       OutputRx::run(stdout, stderr)
//!   [forwarding]           SinkConnector::connect (budget) ──► Forwarder::run
//!
//!   cycle k (since = cfg.since for k = 0, cfg.restart_since afterwards):
//!     for ns in partitions:
//!        platform.watch(ns) ──► MembershipAdapter ──► TailRegistry ──► workers
//!                                      │
//!                           feed ended └──► barrier.arrive()
//!
//!     barrier.wait()  (all N partitions arrived)
//!        └─► BarrierReached ─► drain_all every registry ─► join adapters
//!            ─► SinceReset ─► cycle k+1
//!
//!   token.cancelled()
//!        └─► ShutdownRequested ─► drain_all every registry ─► join adapters ─► Ok(())
//! ```
//!
//! ## Rules
//! - No partition re-watches before every partition of the cycle has ended.
//! - Every worker of cycle `k` has exited before cycle `k+1` opens any stream.
//! - Fatal conditions (no default namespace, watch setup failure, sink budget
//!   exhausted) end the run with a [`RuntimeError`].
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use tailvisor::{Config, LogWriter, Platform, Supervisor, Subscribe};
//!
//! async fn tail(platform: Arc<dyn Platform>) -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config {
//!         namespaces: vec!["shop,payments".into()],
//!         ..Config::default()
//!     };
//!     let renderer = Arc::new(cfg.renderer()?);
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!
//!     Supervisor::builder(cfg)
//!         .with_subscribers(subs)
//!         .build(platform, renderer)
//!         .run_until_signal()
//!         .await?;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex};

use tokio::io::AsyncWrite;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::adapter::{FeedEnd, MembershipAdapter};
use crate::core::barrier::RestartBarrier;
use crate::core::builder::SupervisorBuilder;
use crate::core::shutdown;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::output::{self, LineSink, OutputTx, Render};
use crate::platform::Platform;
use crate::sink::{Forwarder, SinkConnector};
use crate::subscribers::SubscriberSet;
use crate::tail::{TailContext, TailRegistry};

/// Boxed writer for one output lane.
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Partitions of one running cycle.
struct Cycle {
    registries: Vec<Arc<TailRegistry>>,
    adapters: JoinSet<FeedEnd>,
    barrier: RestartBarrier,
    token: CancellationToken,
}

impl Cycle {
    async fn teardown(mut self) {
        self.token.cancel();
        for r in &self.registries {
            let live = r.live().await.len();
            tracing::debug!(live, "draining partition");
            r.drain_all().await;
        }
        while self.adapters.join_next().await.is_some() {}
    }
}

/// Orchestrates partitions, workers, output and the optional forwarding sink.
pub struct Supervisor {
    cfg: Config,
    bus: Bus,
    subs: Mutex<Option<SubscriberSet>>,
    platform: Arc<dyn Platform>,
    renderer: Arc<dyn Render>,
    writers: Mutex<Option<(BoxWriter, BoxWriter)>>,
}

impl Supervisor {
    /// Starts a builder for `cfg`.
    pub fn builder(cfg: Config) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        subs: SubscriberSet,
        platform: Arc<dyn Platform>,
        renderer: Arc<dyn Render>,
        writers: Option<(BoxWriter, BoxWriter)>,
    ) -> Self {
        Self {
            cfg,
            bus,
            subs: Mutex::new(Some(subs)),
            platform,
            renderer,
            writers: Mutex::new(writers),
        }
    }

    /// Event bus shared by every component of this supervisor.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Runs until a termination signal (SIGINT/SIGTERM/SIGQUIT, Ctrl-C elsewhere).
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        let token = CancellationToken::new();
        let run = self.run(token.clone());
        tokio::pin!(run);

        tokio::select! {
            res = &mut run => res,
            sig = shutdown::wait_for_shutdown_signal() => {
                token.cancel();
                let res = run.await;
                sig?;
                res
            }
        }
    }

    /// Runs cycles until `token` is cancelled or a fatal error occurs.
    pub async fn run(&self, token: CancellationToken) -> Result<(), RuntimeError> {
        let runtime = token.child_token();
        // Outlives `runtime` so teardown events still reach subscribers.
        let events_done = CancellationToken::new();
        let listener = self.subscriber_listener(events_done.clone());

        let (out, out_rx) = output::channel(self.cfg.output_capacity_clamped(), runtime.clone());
        let (stdout, stderr) = self.take_writers();
        let consumer = tokio::spawn(async move {
            if let Err(e) = out_rx.run(stdout, stderr).await {
                tracing::error!(error = %e, "output writer failed");
            }
        });

        let res = self.run_cycles(&token, &runtime, out).await;

        runtime.cancel();
        events_done.cancel();
        let _ = consumer.await;
        let _ = listener.await;
        res
    }

    async fn run_cycles(
        &self,
        token: &CancellationToken,
        runtime: &CancellationToken,
        out: OutputTx,
    ) -> Result<(), RuntimeError> {
        let partitions = self.partitions().await?;
        let Some(sink) = self.line_sink(runtime, out).await? else {
            self.bus.publish(Event::new(EventKind::ShutdownRequested));
            return Ok(());
        };

        let mut since = self.cfg.since;
        loop {
            let ctx = TailContext {
                platform: Arc::clone(&self.platform),
                sink: sink.clone(),
                options: self.cfg.tail_options(since),
                bus: self.bus.clone(),
            };
            let cycle = self.start_cycle(&partitions, ctx, runtime).await?;

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    self.bus.publish(Event::new(EventKind::ShutdownRequested));
                    cycle.teardown().await;
                    return Ok(());
                }
                _ = cycle.barrier.wait() => {
                    self.bus.publish(Event::new(EventKind::BarrierReached));
                    cycle.teardown().await;
                    since = self.cfg.restart_since;
                    self.bus.publish(Event::new(EventKind::SinceReset).with_delay(since));
                }
            }
        }
    }

    /// Configured namespaces, or the platform default when none are set.
    async fn partitions(&self) -> Result<Vec<String>, RuntimeError> {
        let list = self.cfg.namespace_list();
        if !list.is_empty() {
            return Ok(list);
        }
        let ns = self
            .platform
            .default_namespace()
            .await
            .map_err(|source| RuntimeError::DefaultNamespace { source })?;
        Ok(vec![ns])
    }

    /// Console sink, or a connected forwarding sink; `None` if cancelled while connecting.
    async fn line_sink(
        &self,
        runtime: &CancellationToken,
        out: OutputTx,
    ) -> Result<Option<LineSink>, RuntimeError> {
        let Some(fwd) = &self.cfg.forward else {
            return Ok(Some(LineSink::console(Arc::clone(&self.renderer), out)));
        };

        let mut connector =
            SinkConnector::tcp(fwd, self.bus.clone()).with_notices(out.clone());
        let Some(conn) = connector.connect(runtime).await? else {
            return Ok(None);
        };
        let (forwarder, tx) = Forwarder::new(
            fwd,
            self.cfg.forward_host(),
            connector.dialer(),
            conn,
            self.bus.clone(),
            runtime.clone(),
        );
        tokio::spawn(forwarder.run(runtime.clone()));
        Ok(Some(LineSink::forwarding(tx, out)))
    }

    /// Watches every partition and spawns its adapter.
    ///
    /// A watch failure tears down the partitions already started.
    async fn start_cycle(
        &self,
        partitions: &[String],
        ctx: TailContext,
        runtime: &CancellationToken,
    ) -> Result<Cycle, RuntimeError> {
        let mut cycle = Cycle {
            registries: Vec::with_capacity(partitions.len()),
            adapters: JoinSet::new(),
            barrier: RestartBarrier::new(partitions.len()),
            token: runtime.child_token(),
        };

        for ns in partitions {
            let feed = match self.platform.watch(&self.cfg.watch_query(ns)).await {
                Ok(feed) => feed,
                Err(source) => {
                    cycle.teardown().await;
                    return Err(RuntimeError::WatchSetup {
                        namespace: ns.clone(),
                        source,
                    });
                }
            };
            let registry = TailRegistry::new(ctx.clone(), cycle.token.clone());
            let adapter = MembershipAdapter::new(ns, Arc::clone(&registry), self.bus.clone());
            cycle
                .adapters
                .spawn(adapter.run(feed, cycle.barrier.clone(), cycle.token.clone()));
            cycle.registries.push(registry);
            self.bus
                .publish(Event::new(EventKind::PartitionStarted).with_partition(ns.as_str()));
        }
        Ok(cycle)
    }

    /// Subscribes to the bus and forwards events to the subscriber set until `stop`.
    ///
    /// On stop, pending events are emitted and the subscriber workers are joined.
    /// The set belongs to the first run; later runs publish to the bus only.
    fn subscriber_listener(&self, stop: CancellationToken) -> tokio::task::JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        let set = self
            .subs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        tokio::spawn(async move {
            let Some(set) = set else {
                return;
            };
            loop {
                tokio::select! {
                    biased;
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(ev),
                        Err(RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "subscriber listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        while let Ok(ev) = rx.try_recv() {
                            set.emit(ev);
                        }
                        break;
                    }
                }
            }
            set.shutdown().await;
        })
    }

    fn take_writers(&self) -> (BoxWriter, BoxWriter) {
        let taken = self
            .writers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        taken.unwrap_or_else(|| (Box::new(tokio::io::stdout()), Box::new(tokio::io::stderr())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForwardConfig;
    use crate::platform::{MembershipEvent, Target};
    use crate::policies::{BackoffPolicy, JitterPolicy};
    use crate::subscribers::Subscribe;
    use crate::testing::FakePlatform;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
    use tokio::sync::broadcast;

    type LineReader = Lines<BufReader<DuplexStream>>;

    fn config(namespaces: &str) -> Config {
        Config {
            namespaces: vec![namespaces.to_owned()],
            template: "{pod} {message}".to_owned(),
            color: false,
            ..Config::default()
        }
    }

    fn build(cfg: Config, platform: &Arc<FakePlatform>) -> (Arc<Supervisor>, LineReader, LineReader) {
        let (out_w, out_r) = tokio::io::duplex(64 * 1024);
        let (err_w, err_r) = tokio::io::duplex(64 * 1024);
        let renderer = Arc::new(cfg.renderer().unwrap());
        let sup = Supervisor::builder(cfg)
            .with_writers(Box::new(out_w), Box::new(err_w))
            .build(Arc::clone(platform) as Arc<dyn Platform>, renderer);
        (sup, BufReader::new(out_r).lines(), BufReader::new(err_r).lines())
    }

    fn start(
        sup: &Arc<Supervisor>,
        token: &CancellationToken,
    ) -> tokio::task::JoinHandle<Result<(), RuntimeError>> {
        let sup = Arc::clone(sup);
        let token = token.clone();
        tokio::spawn(async move { sup.run(token).await })
    }

    async fn next_line(lines: &mut LineReader) -> String {
        tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .expect("line in time")
            .unwrap()
            .expect("writer still open")
    }

    /// Kinds seen up to and including the first `kind`.
    async fn until(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Vec<EventKind> {
        let mut seen = Vec::new();
        loop {
            let ev = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("event in time")
                .unwrap();
            seen.push(ev.kind);
            if ev.kind == kind {
                return seen;
            }
        }
    }

    #[tokio::test]
    async fn test_removed_target_stops_while_others_continue() {
        let platform = Arc::new(FakePlatform::new());
        let pod_a = Target::new("ns1", "pod-a", "c1", "n1");
        let pod_b = Target::new("ns1", "pod-b", "c1", "n1");
        let mut wa = platform.script_stream(&pod_a);
        let mut wb = platform.script_stream(&pod_b);

        let (sup, mut stdout, mut stderr) = build(config("ns1"), &platform);
        let token = CancellationToken::new();
        let run = start(&sup, &token);

        let feed = platform.take_feed("ns1", 0).await;
        feed.send(MembershipEvent::Added(pod_a.clone())).unwrap();
        feed.send(MembershipEvent::Added(pod_b.clone())).unwrap();
        platform.wait_opened(&pod_a.id(), 1).await;
        platform.wait_opened(&pod_b.id(), 1).await;

        wa.write_all(b"a1\n").await.unwrap();
        wb.write_all(b"b1\n").await.unwrap();
        let mut first = vec![next_line(&mut stdout).await, next_line(&mut stdout).await];
        first.sort();
        assert_eq!(first, vec!["pod-a a1", "pod-b b1"]);

        feed.send(MembershipEvent::Removed(pod_a.clone())).unwrap();
        let mut markers = Vec::new();
        loop {
            let line = next_line(&mut stderr).await;
            let done = line == "- pod-a";
            markers.push(line);
            if done {
                break;
            }
        }
        assert!(markers.contains(&"+ pod-a › c1".to_owned()));
        assert!(markers.contains(&"+ pod-b › c1".to_owned()));

        let _ = wa.write_all(b"a2\n").await;
        wb.write_all(b"b2\n").await.unwrap();
        assert_eq!(next_line(&mut stdout).await, "pod-b b2");

        token.cancel();
        run.await.unwrap().unwrap();
        assert_eq!(platform.open_count(&pod_a.id()), 1);
    }

    /// Keeps every `TailClosed` target and whether shutdown was requested.
    #[derive(Default)]
    struct Recorder {
        closed: Mutex<Vec<String>>,
        shutdown: Mutex<bool>,
    }

    #[async_trait::async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            match ev.kind {
                EventKind::TailClosed => {
                    if let Some(t) = ev.target.as_deref() {
                        self.closed.lock().unwrap().push(t.to_owned());
                    }
                }
                EventKind::ShutdownRequested => *self.shutdown.lock().unwrap() = true,
                _ => {}
            }
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_every_partition() {
        let platform = Arc::new(FakePlatform::new());
        let in_ns1 = Target::new("ns1", "pod-a", "c1", "n1");
        let in_ns2 = Target::new("ns2", "pod-b", "c1", "n1");
        let _w1 = platform.script_stream(&in_ns1);
        let _w2 = platform.script_stream(&in_ns2);

        let (out_w, _out_r) = tokio::io::duplex(64 * 1024);
        let (err_w, _err_r) = tokio::io::duplex(64 * 1024);
        let cfg = config("ns1,ns2");
        let renderer = Arc::new(cfg.renderer().unwrap());
        let recorder = Arc::new(Recorder::default());
        let sup = Supervisor::builder(cfg)
            .with_subscribers(vec![Arc::clone(&recorder) as Arc<dyn Subscribe>])
            .with_writers(Box::new(out_w), Box::new(err_w))
            .build(Arc::clone(&platform) as Arc<dyn Platform>, renderer);
        let token = CancellationToken::new();
        let run = start(&sup, &token);

        let ns1 = platform.take_feed("ns1", 0).await;
        let ns2 = platform.take_feed("ns2", 0).await;
        ns1.send(MembershipEvent::Added(in_ns1.clone())).unwrap();
        ns2.send(MembershipEvent::Added(in_ns2.clone())).unwrap();
        platform.wait_opened(&in_ns1.id(), 1).await;
        platform.wait_opened(&in_ns2.id(), 1).await;
        assert!(recorder.closed.lock().unwrap().is_empty());

        token.cancel();
        run.await.unwrap().unwrap();

        assert!(*recorder.shutdown.lock().unwrap());
        let mut closed = recorder.closed.lock().unwrap().clone();
        closed.sort();
        assert_eq!(
            closed,
            vec![in_ns1.id().to_string(), in_ns2.id().to_string()]
        );
    }

    #[tokio::test]
    async fn test_restart_waits_for_every_partition() {
        let platform = Arc::new(FakePlatform::new());
        let target = Target::new("ns1", "pod-a", "c1", "n1");
        let _first = platform.script_stream(&target);
        let _second = platform.script_stream(&target);

        let (sup, _stdout, _stderr) = build(config("ns1,ns2"), &platform);
        let mut events = sup.bus().subscribe();
        let token = CancellationToken::new();
        let run = start(&sup, &token);

        let ns1 = platform.take_feed("ns1", 0).await;
        let ns2 = platform.take_feed("ns2", 0).await;
        ns1.send(MembershipEvent::Added(target.clone())).unwrap();
        platform.wait_opened(&target.id(), 1).await;

        drop(ns1);
        until(&mut events, EventKind::PartitionRestartRequested).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(platform.watch_count("ns1"), 1);
        assert_eq!(platform.watch_count("ns2"), 1);
        assert_eq!(platform.open_count(&target.id()), 1);

        drop(ns2);
        let seen = until(&mut events, EventKind::SinceReset).await;
        let closed = seen.iter().position(|k| *k == EventKind::TailClosed);
        let barrier = seen.iter().position(|k| *k == EventKind::BarrierReached);
        assert!(barrier.is_some());
        assert!(closed > barrier, "cycle 0 worker drained after the barrier");

        let ns1 = platform.take_feed("ns1", 1).await;
        let _ns2 = platform.take_feed("ns2", 1).await;
        ns1.send(MembershipEvent::Added(target.clone())).unwrap();
        platform.wait_opened(&target.id(), 2).await;
        assert_eq!(platform.opened_since(&target.id()), vec![48 * 60 * 60, 1]);

        token.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_watch_failure_is_fatal() {
        let platform = Arc::new(FakePlatform::new());
        platform.fail_watch("ns2");
        let (sup, _stdout, _stderr) = build(config("ns1,ns2"), &platform);

        let err = sup.run(CancellationToken::new()).await.unwrap_err();
        match err {
            RuntimeError::WatchSetup { namespace, .. } => assert_eq!(namespace, "ns2"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_default_namespace_is_fatal() {
        let platform = Arc::new(FakePlatform::new());
        platform.set_default_namespace(None);
        let cfg = Config {
            namespaces: Vec::new(),
            ..config("")
        };
        let (sup, _stdout, _stderr) = build(cfg, &platform);

        let err = sup.run(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.as_label(), "runtime_default_namespace");
        assert_eq!(platform.watch_count("default"), 0);
    }

    #[tokio::test]
    async fn test_default_namespace_used_when_unset() {
        let platform = Arc::new(FakePlatform::new());
        let cfg = Config {
            namespaces: Vec::new(),
            ..config("")
        };
        let (sup, _stdout, _stderr) = build(cfg, &platform);
        let token = CancellationToken::new();
        let run = start(&sup, &token);

        let _feed = platform.take_feed("default", 0).await;
        token.cancel();
        run.await.unwrap().unwrap();
        assert_eq!(platform.watch_count("default"), 1);
    }

    #[tokio::test]
    async fn test_forwarding_sends_gelf_frames() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let platform = Arc::new(FakePlatform::new());
        let target = Target::new("ns1", "pod-a", "c1", "n1");
        let mut writer = platform.script_stream(&target);
        let cfg = Config {
            cluster_name: Some("prod".to_owned()),
            forward: Some(ForwardConfig::new(addr)),
            ..config("ns1")
        };
        let (sup, _stdout, _stderr) = build(cfg, &platform);
        let token = CancellationToken::new();
        let run = start(&sup, &token);

        let (socket, _) = listener.accept().await.unwrap();
        let feed = platform.take_feed("ns1", 0).await;
        feed.send(MembershipEvent::Added(target.clone())).unwrap();
        platform.wait_opened(&target.id(), 1).await;
        writer.write_all(b"disk full\n").await.unwrap();

        let mut reader = BufReader::new(socket);
        let mut frame = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), reader.read_until(0, &mut frame))
            .await
            .expect("frame in time")
            .unwrap();
        assert_eq!(frame.pop(), Some(0));
        let json: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(json["host"], "prod");
        assert_eq!(json["full_message"], "disk full");
        assert_eq!(json["_pod_name"], "pod-a");
        assert_eq!(json["_container_name"], "c1");

        token.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_sink_ends_run() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let platform = Arc::new(FakePlatform::new());
        let backoff = BackoffPolicy {
            first: Duration::from_millis(5),
            max: Duration::from_millis(5),
            factor: 1.0,
            jitter: JitterPolicy::None,
        };
        let cfg = Config {
            forward: Some(
                ForwardConfig::new(addr)
                    .with_retries(2)
                    .with_backoff(backoff),
            ),
            ..config("ns1")
        };
        let (sup, _stdout, _stderr) = build(cfg, &platform);

        let err = sup.run(CancellationToken::new()).await.unwrap_err();
        match err {
            RuntimeError::SinkUnavailable { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(platform.watch_count("ns1"), 0);
    }
}
