//! # Line sink: where a worker's lines go.
//!
//! Exactly one mode per run:
//! - **Console**: render through the template and push to the stdout lane.
//! - **Forwarding**: hand the raw line plus its source to the forwarder;
//!   nothing reaches the local stdout.
//!
//! Lifecycle markers and diagnostics always use the stderr lane.

use std::sync::Arc;

use crate::output::mux::{OutputClosed, OutputLine, OutputTx};
use crate::output::render::{LogRecord, PodColors, Render, start_marker, stop_marker};
use crate::platform::Target;
use crate::sink::{ForwardRecord, ForwardTx};

/// Destination of a worker's lines.
#[derive(Clone)]
pub enum LineSink {
    Console {
        renderer: Arc<dyn Render>,
        out: OutputTx,
    },
    Forwarding {
        forward: ForwardTx,
        out: OutputTx,
    },
}

impl LineSink {
    pub fn console(renderer: Arc<dyn Render>, out: OutputTx) -> Self {
        LineSink::Console { renderer, out }
    }

    pub fn forwarding(forward: ForwardTx, out: OutputTx) -> Self {
        LineSink::Forwarding { forward, out }
    }

    fn out(&self) -> &OutputTx {
        match self {
            LineSink::Console { out, .. } | LineSink::Forwarding { out, .. } => out,
        }
    }

    /// True in forwarding mode.
    pub fn is_forwarding(&self) -> bool {
        matches!(self, LineSink::Forwarding { .. })
    }

    /// Delivers one log line of `target`.
    ///
    /// A render failure is reported on stderr and the line is dropped.
    pub async fn line(
        &self,
        target: &Target,
        message: &str,
        colors: Option<PodColors>,
    ) -> Result<(), OutputClosed> {
        match self {
            LineSink::Console { renderer, out } => {
                let record = LogRecord {
                    target,
                    message,
                    colors,
                };
                match renderer.render(&record) {
                    Ok(text) => out.send(OutputLine::stdout(text, Some(target.id()))).await,
                    Err(err) => {
                        out.send(OutputLine::stderr(
                            format!("expanding template failed: {err}"),
                            Some(target.id()),
                        ))
                        .await
                    }
                }
            }
            LineSink::Forwarding { forward, .. } => {
                forward
                    .send(ForwardRecord::now(target.clone(), message.to_owned()))
                    .await
            }
        }
    }

    /// Writes the `+` marker.
    pub async fn started(
        &self,
        target: &Target,
        show_namespace: bool,
        colors: Option<PodColors>,
    ) -> Result<(), OutputClosed> {
        let text = start_marker(target, show_namespace, colors);
        self.out()
            .send(OutputLine::stderr(text, Some(target.id())))
            .await
    }

    /// Writes the `-` marker; forwarding mode stays silent.
    pub async fn stopped(
        &self,
        target: &Target,
        show_namespace: bool,
        colors: Option<PodColors>,
    ) -> Result<(), OutputClosed> {
        if self.is_forwarding() {
            return Ok(());
        }
        let text = stop_marker(target, show_namespace, colors);
        self.out()
            .send(OutputLine::stderr(text, Some(target.id())))
            .await
    }

    /// Writes a diagnostic line on stderr.
    pub async fn diagnostic(&self, target: &Target, text: String) -> Result<(), OutputClosed> {
        self.out()
            .send(OutputLine::stderr(text, Some(target.id())))
            .await
    }
}
