//! # Tailing: workers and the per-partition registry.
//!
//! - [`TailRegistry`] keeps at most one live worker per [`TargetId`](crate::TargetId).
//! - a worker ([`TailHandle`]) follows one target's stream until EOF, error or cancellation.
//! - [`LineFilter`] applies the include/exclude line patterns.

mod filter;
mod registry;
mod worker;

pub use filter::LineFilter;
pub use registry::{AddOutcome, TailRegistry};
pub use worker::{TailContext, TailHandle, TailState};
