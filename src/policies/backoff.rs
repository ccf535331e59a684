//! # Backoff policy for connection retries.
//!
//! [`BackoffPolicy`] controls how the delay between connection attempts grows.
//! It is parameterized by:
//! - [`BackoffPolicy::first`] the delay after the first failed attempt;
//! - [`BackoffPolicy::factor`] the multiplicative growth factor;
//! - [`BackoffPolicy::max`] the maximum delay cap;
//! - [`BackoffPolicy::jitter`] the randomization applied on top.
//!
//! The base delay after failed attempt `n` (0-indexed) is `first × factor^n`,
//! clamped to `max`, then jitter is applied. The base derives from the attempt
//! number alone, so a short jittered delay never drags later delays down.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use tailvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(10),
//!     max: Duration::from_secs(60),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_secs(10));
//! assert_eq!(backoff.next(1), Duration::from_secs(20));
//! assert_eq!(backoff.next(5), Duration::from_secs(60));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub first: Duration,
    /// Maximum delay cap (before jitter).
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter policy to spread retries.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns the forwarding connector policy:
    /// - `first = 10s`;
    /// - `factor = 1.25` (mean growth of ~1.25x per attempt with proportional jitter on top);
    /// - `max = 15min`;
    /// - `jitter = Proportional`.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(10),
            max: Duration::from_secs(15 * 60),
            factor: 1.25,
            jitter: JitterPolicy::Proportional,
        }
    }
}

impl BackoffPolicy {
    /// Returns the unjittered base delay for failed attempt `attempt` (0-indexed).
    pub fn base(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Computes the jittered delay for failed attempt `attempt` (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.base(attempt))
    }
}
