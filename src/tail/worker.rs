//! # Tail worker: follows one target's log stream.
//!
//! One worker per live [`TargetId`]. It opens the follow-mode stream, filters
//! lines and hands each surviving line to its [`LineSink`].
//!
//! ## Lifecycle
//! ```text
//! spawn ──► Starting ──open ok──► Active ──EOF / read error / cancel──► Closed
//!              │                                                          ▲
//!              └──────────open failed / cancelled before open─────────────┘
//! ```
//!
//! ## Rules
//! - The start marker is written before the stream is opened; the stop marker
//!   before the state becomes `Closed`.
//! - An open failure is reported on stderr; the worker closes without retrying.
//!   A later Added for the same identity is the only retry path.
//! - A trailing chunk without a newline at end of stream is discarded.
//! - Cancellation stops reading; lines already read are still delivered.
//! - The state only moves forward.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::TailOptions;
use crate::error::TailError;
use crate::events::{Bus, Event, EventKind};
use crate::output::{LineSink, Palette, PodColors};
use crate::platform::{LogStream, Platform, Target, TargetId};

/// Observable worker state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TailState {
    /// Spawned, stream not open yet.
    Starting,
    /// Stream open, lines flowing.
    Active,
    /// Finished for any reason; never reopens.
    Closed,
}

impl TailState {
    /// True for `Starting` and `Active`.
    #[inline]
    pub fn is_live(self) -> bool {
        !matches!(self, TailState::Closed)
    }
}

/// Everything workers of one run cycle share.
#[derive(Clone)]
pub struct TailContext {
    pub platform: Arc<dyn Platform>,
    pub sink: LineSink,
    pub options: Arc<TailOptions>,
    pub bus: Bus,
}

/// Owner's handle to a spawned worker.
pub struct TailHandle {
    state: watch::Receiver<TailState>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl TailHandle {
    /// Current state.
    pub fn state(&self) -> TailState {
        *self.state.borrow()
    }

    /// Requests the worker to stop reading.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Splits into the join handle, for callers that wait on completion.
    pub(crate) fn into_join(self) -> JoinHandle<()> {
        self.join
    }
}

/// Spawns a worker for `target`; `cancel` is this worker's own token.
pub fn spawn(ctx: &TailContext, target: Target, cancel: CancellationToken) -> TailHandle {
    let (state_tx, state_rx) = watch::channel(TailState::Starting);
    let worker = TailWorker {
        ctx: ctx.clone(),
        id: target.id(),
        target,
        state: state_tx,
    };
    let token = cancel.clone();
    let join = tokio::spawn(async move { worker.run(token).await });
    TailHandle {
        state: state_rx,
        cancel,
        join,
    }
}

struct TailWorker {
    ctx: TailContext,
    target: Target,
    id: TargetId,
    state: watch::Sender<TailState>,
}

impl TailWorker {
    async fn run(self, cancel: CancellationToken) {
        let opts = Arc::clone(&self.ctx.options);
        let colors = opts.color.then(|| Palette::for_pod(&self.target.pod));

        self.publish(Event::tail(EventKind::TailStarting, &self.id));
        let _ = self
            .ctx
            .sink
            .started(&self.target, opts.show_namespace, colors)
            .await;

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = self.ctx.platform.open_log_stream(&self.target, &opts.stream) => Some(res),
        };

        let reason = match opened {
            None => "cancelled".to_owned(),
            Some(Err(source)) => {
                let err = TailError::StreamOpen {
                    namespace: self.target.namespace.to_string(),
                    pod: self.target.pod.to_string(),
                    container: self.target.container.to_string(),
                    source,
                };
                tracing::debug!(subject = %self.id, error = %err, "log stream open failed");
                self.publish(
                    Event::tail(EventKind::TailOpenFailed, &self.id).with_reason(err.to_string()),
                );
                let _ = self.ctx.sink.diagnostic(&self.target, err.to_string()).await;
                err.as_label().to_owned()
            }
            Some(Ok(stream)) => {
                self.state.send_replace(TailState::Active);
                self.publish(Event::tail(EventKind::TailActive, &self.id));
                self.follow(stream, colors, &cancel).await
            }
        };

        let _ = self
            .ctx
            .sink
            .stopped(&self.target, opts.show_namespace, colors)
            .await;
        self.state.send_replace(TailState::Closed);
        self.publish(Event::tail(EventKind::TailClosed, &self.id).with_reason(reason));
    }

    /// Reads until EOF, a read error, cancellation or output shutdown.
    async fn follow(
        &self,
        stream: LogStream,
        colors: Option<PodColors>,
        cancel: &CancellationToken,
    ) -> String {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::with_capacity(256);

        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return "cancelled".to_owned(),
                res = reader.read_until(b'\n', &mut buf) => res,
            };
            match read {
                Ok(0) => return "end_of_stream".to_owned(),
                // unterminated chunk at EOF is not a line
                Ok(_) if buf.last() != Some(&b'\n') => return "end_of_stream".to_owned(),
                Ok(_) => {}
                Err(e) => {
                    let err = TailError::Read(e);
                    tracing::debug!(subject = %self.id, error = %err, "log stream read failed");
                    return err.as_label().to_owned();
                }
            }

            let line = String::from_utf8_lossy(trim_newline(&buf));
            if !self.ctx.options.filter.accepts(&line) {
                continue;
            }
            if self.ctx.sink.line(&self.target, &line, colors).await.is_err() {
                return "output_closed".to_owned();
            }
        }
    }

    fn publish(&self, ev: Event) {
        self.ctx
            .bus
            .publish(ev.with_partition(Arc::clone(&self.target.namespace)));
    }
}

fn trim_newline(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::output::{self, Lane, TemplateRenderer};
    use crate::testing::FakePlatform;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn context(platform: Arc<FakePlatform>, out: output::OutputTx, cfg: &Config) -> TailContext {
        let renderer = Arc::new(TemplateRenderer::parse("{pod} {message}").unwrap());
        TailContext {
            platform,
            sink: LineSink::console(renderer, out),
            options: cfg.tail_options(cfg.since),
            bus: Bus::new(64),
        }
    }

    fn plain() -> Config {
        Config {
            color: false,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_lines_flow_in_order_then_close_on_eof() {
        let platform = Arc::new(FakePlatform::new());
        let target = Target::new("shop", "cart", "api", "n1");
        let mut writer = platform.script_stream(&target);
        let (out, mut rx) = output::channel(16, CancellationToken::new());
        let ctx = context(Arc::clone(&platform), out, &plain());

        let handle = spawn(&ctx, target.clone(), CancellationToken::new());
        writer.write_all(b"one\ntwo\r\nthree\n").await.unwrap();
        drop(writer);

        let mut got = Vec::new();
        for _ in 0..5 {
            let line = rx.recv().await.unwrap();
            got.push((line.lane, line.text));
        }
        assert_eq!(
            got,
            vec![
                (Lane::Stderr, "+ cart › api".to_owned()),
                (Lane::Stdout, "cart one".to_owned()),
                (Lane::Stdout, "cart two".to_owned()),
                (Lane::Stdout, "cart three".to_owned()),
                (Lane::Stderr, "- cart".to_owned()),
            ]
        );
        handle.into_join().await.unwrap();
    }

    #[tokio::test]
    async fn test_partial_last_line_is_dropped() {
        let platform = Arc::new(FakePlatform::new());
        let target = Target::new("shop", "cart", "api", "n1");
        let mut writer = platform.script_stream(&target);
        let (out, mut rx) = output::channel(16, CancellationToken::new());
        let ctx = context(Arc::clone(&platform), out, &plain());

        let handle = spawn(&ctx, target.clone(), CancellationToken::new());
        writer.write_all(b"full\npartial-no-newline").await.unwrap();
        drop(writer);
        handle.into_join().await.unwrap();

        let mut got = Vec::new();
        for _ in 0..3 {
            got.push(rx.recv().await.unwrap().text);
        }
        assert_eq!(got, vec!["+ cart › api", "cart full", "- cart"]);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_open_failure_closes_without_retry() {
        let platform = Arc::new(FakePlatform::new());
        let target = Target::new("shop", "cart", "api", "n1");
        let (out, mut rx) = output::channel(16, CancellationToken::new());
        let ctx = context(Arc::clone(&platform), out, &plain());

        let handle = spawn(&ctx, target.clone(), CancellationToken::new());
        let mut state = handle.state.clone();
        state.wait_for(|s| *s == TailState::Closed).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().text, "+ cart › api");
        let err = rx.recv().await.unwrap();
        assert_eq!(err.lane, Lane::Stderr);
        assert!(err.text.starts_with("Error opening stream to shop/cart: api:"));
        assert_eq!(rx.recv().await.unwrap().text, "- cart");
        assert_eq!(platform.open_count(&target.id()), 1);
        handle.into_join().await.unwrap();
    }

    #[tokio::test]
    async fn test_filter_and_cancel() {
        let platform = Arc::new(FakePlatform::new());
        let target = Target::new("shop", "cart", "api", "n1");
        let mut writer = platform.script_stream(&target);
        let (out, mut rx) = output::channel(16, CancellationToken::new());
        let cfg = Config {
            exclude: vec![regex::Regex::new("healthz").unwrap()],
            ..plain()
        };
        let ctx = context(Arc::clone(&platform), out, &cfg);

        let token = CancellationToken::new();
        let handle = spawn(&ctx, target.clone(), token.clone());
        writer.write_all(b"GET /healthz\nGET /cart\n").await.unwrap();

        assert_eq!(rx.recv().await.unwrap().text, "+ cart › api");
        assert_eq!(rx.recv().await.unwrap().text, "cart GET /cart");
        assert_eq!(handle.state(), TailState::Active);

        handle.cancel();
        assert_eq!(rx.recv().await.unwrap().text, "- cart");
        tokio::time::timeout(Duration::from_secs(1), handle.into_join())
            .await
            .expect("worker exits after cancel")
            .unwrap();
    }
}
