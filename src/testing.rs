//! Scripted in-memory [`Platform`] for unit tests.
//!
//! - log streams are `tokio::io::duplex` pairs queued per identity; an open
//!   with nothing queued fails
//! - each `watch` call creates a fresh feed whose sender the test takes and
//!   drops to end the feed
//! - every open and watch is recorded

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::DuplexStream;
use tokio::sync::{Notify, mpsc};

use crate::error::PlatformError;
use crate::platform::{
    LogStream, LogStreamOptions, MembershipEvent, MembershipFeed, Platform, Target, TargetId,
    WatchQuery,
};

#[derive(Default)]
struct Inner {
    streams: HashMap<TargetId, VecDeque<DuplexStream>>,
    opens: Vec<(TargetId, LogStreamOptions)>,
    feeds: HashMap<String, Vec<Option<mpsc::UnboundedSender<MembershipEvent>>>>,
    failing_watch: HashSet<String>,
    default_namespace: Option<String>,
}

pub(crate) struct FakePlatform {
    inner: Mutex<Inner>,
    changed: Notify,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                default_namespace: Some("default".to_owned()),
                ..Inner::default()
            }),
            changed: Notify::new(),
        }
    }

    fn peek<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut inner)
    }

    /// Like `peek`, then wakes every `wait_until`.
    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let r = self.peek(f);
        self.changed.notify_waiters();
        r
    }

    async fn wait_until(&self, mut cond: impl FnMut(&mut Inner) -> bool) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.peek(&mut cond) {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn set_default_namespace(&self, ns: Option<&str>) {
        self.with(|i| i.default_namespace = ns.map(str::to_owned));
    }

    pub(crate) fn fail_watch(&self, namespace: &str) {
        self.with(|i| i.failing_watch.insert(namespace.to_owned()));
    }

    /// Queues a stream for the next open of `target`; returns its write side.
    pub(crate) fn script_stream(&self, target: &Target) -> DuplexStream {
        let (writer, reader) = tokio::io::duplex(64 * 1024);
        self.with(|i| {
            i.streams.entry(target.id()).or_default().push_back(reader);
        });
        writer
    }

    pub(crate) fn open_count(&self, id: &TargetId) -> usize {
        self.peek(|i| i.opens.iter().filter(|(o, _)| o == id).count())
    }

    /// `since_secs` of every open of `id`, in order.
    pub(crate) fn opened_since(&self, id: &TargetId) -> Vec<i64> {
        self.peek(|i| {
            i.opens
                .iter()
                .filter(|(o, _)| o == id)
                .map(|(_, opts)| opts.since_secs)
                .collect()
        })
    }

    pub(crate) async fn wait_opened(&self, id: &TargetId, n: usize) {
        self.wait_until(|i| i.opens.iter().filter(|(o, _)| o == id).count() >= n)
            .await;
    }

    pub(crate) fn watch_count(&self, namespace: &str) -> usize {
        self.peek(|i| i.feeds.get(namespace).map_or(0, Vec::len))
    }

    /// Takes the sender of the `cycle`-th watch of `namespace`, waiting for it.
    ///
    /// Dropping the returned sender ends that feed.
    pub(crate) async fn take_feed(
        &self,
        namespace: &str,
        cycle: usize,
    ) -> mpsc::UnboundedSender<MembershipEvent> {
        let mut taken = None;
        self.wait_until(|i| {
            taken = i
                .feeds
                .get_mut(namespace)
                .and_then(|f| f.get_mut(cycle))
                .and_then(Option::take);
            taken.is_some()
        })
        .await;
        match taken {
            Some(tx) => tx,
            None => unreachable!("wait_until returned without a feed"),
        }
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn watch(&self, query: &WatchQuery) -> Result<MembershipFeed, PlatformError> {
        let ns = query.namespace.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let failing = self.with(|i| {
            if i.failing_watch.contains(&ns) {
                return true;
            }
            i.feeds.entry(ns.clone()).or_default().push(Some(tx));
            false
        });
        if failing {
            return Err(PlatformError::Watch(format!("watch refused for {ns:?}")));
        }
        let feed = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|ev| (ev, rx))
        });
        Ok(feed.boxed())
    }

    async fn open_log_stream(
        &self,
        target: &Target,
        opts: &LogStreamOptions,
    ) -> Result<LogStream, PlatformError> {
        let id = target.id();
        let stream = self.with(|i| {
            i.opens.push((id.clone(), opts.clone()));
            i.streams.get_mut(&id).and_then(VecDeque::pop_front)
        });
        match stream {
            Some(s) => Ok(Box::new(s)),
            None => Err(PlatformError::Stream(format!("no stream scripted for {id}"))),
        }
    }

    async fn default_namespace(&self) -> Result<String, PlatformError> {
        self.peek(|i| i.default_namespace.clone())
            .ok_or_else(|| PlatformError::Namespace("no current context".to_owned()))
    }
}
