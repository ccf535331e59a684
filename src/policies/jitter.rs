//! # Jitter policy for retry delays.
//!
//! [`JitterPolicy`] adds randomness to backoff delays so that many tailers
//! restarting together do not hit the forwarding endpoint in lockstep.
//!
//! - [`JitterPolicy::None`]: no randomization, predictable delays
//! - [`JitterPolicy::Full`]: random delay in [0, delay]
//! - [`JitterPolicy::Equal`]: delay/2 + random[0, delay/2]
//! - [`JitterPolicy::Proportional`]: delay + random[0, delay/2] (never shorter than the base)

use rand::Rng;
use std::time::Duration;

/// Policy controlling randomization of retry delays.
///
/// ## Trade-offs
/// - **None**: Predictable, but risks synchronized retries
/// - **Full**: Maximum spread, may retry almost immediately
/// - **Equal**: Balanced, keeps at least half the delay
/// - **Proportional**: Only ever lengthens the delay (connector default)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No jitter: use exact backoff delay.
    #[default]
    None,

    /// Full jitter: random delay in [0, delay].
    Full,

    /// Equal jitter: delay/2 + random[0, delay/2].
    Equal,

    /// Proportional jitter: delay + random[0, delay/2].
    ///
    /// The added amount scales with the current delay, so spread grows as
    /// retries back off.
    Proportional,
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis().min(u128::from(u64::MAX)) as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => Duration::from_millis(rand::rng().random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                Duration::from_millis(half + random_up_to(half))
            }
            JitterPolicy::Proportional => {
                Duration::from_millis(ms.saturating_add(random_up_to(ms / 2)))
            }
        }
    }
}

fn random_up_to(n: u64) -> u64 {
    if n == 0 {
        0
    } else {
        rand::rng().random_range(0..=n)
    }
}
