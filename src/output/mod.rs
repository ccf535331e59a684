//! # Output: formatting and the shared stdout/stderr writer.
//!
//! - [`mux`](channel) bounded many-to-one queue with backpressure
//! - [`Render`] / [`TemplateRenderer`] line formatting, [`Palette`] pod colours
//! - [`LineSink`] console or forwarding destination for a worker

mod mux;
mod render;
mod sink;

pub use mux::{DEFAULT_CAPACITY, Lane, OutputClosed, OutputLine, OutputRx, OutputTx, channel};
pub use render::{
    LogRecord, Palette, PodColors, Render, TemplateRenderer, start_marker, stop_marker,
};
pub use sink::LineSink;
