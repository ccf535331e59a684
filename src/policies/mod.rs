//! Retry policies for the forwarding sink connector.
//!
//! ## Contents
//! - [`BackoffPolicy`] how retry delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized retries
//!
//! ## Quick wiring
//! ```text
//! ForwardConfig { retries, backoff: BackoffPolicy, .. }
//!      └─► sink::SinkConnector::connect uses:
//!           - retries as the attempt budget
//!           - backoff.next(failed_attempt) to schedule the next attempt
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=10s, factor=1.25, max=15min, jitter=Proportional.
//! - `JitterPolicy::None` by default.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
