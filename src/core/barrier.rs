//! # Restart barrier across partitions.
//!
//! Every partition's adapter calls [`RestartBarrier::arrive`] once when its
//! feed terminates. The supervisor waits for all of them before tearing the
//! cycle down, so no partition restarts while another is still running.
//!
//! ```text
//! adapter ns-a ──arrive()──┐
//! adapter ns-b ──arrive()──┼──► remaining: N → 0 ──► wait() returns
//! adapter ns-c ──arrive()──┘
//! ```
//!
//! A barrier serves one cycle; the supervisor creates a fresh one per cycle.

use std::sync::Arc;

use tokio::sync::watch;

/// Countdown barrier for one run cycle.
#[derive(Clone, Debug)]
pub struct RestartBarrier {
    remaining: Arc<watch::Sender<usize>>,
}

impl RestartBarrier {
    /// Barrier expecting `parties` arrivals.
    pub fn new(parties: usize) -> Self {
        let (tx, _rx) = watch::channel(parties);
        Self {
            remaining: Arc::new(tx),
        }
    }

    /// Records one arrival; returns true for the arrival that completes the barrier.
    pub fn arrive(&self) -> bool {
        let mut completed = false;
        self.remaining.send_modify(|r| {
            if *r > 0 {
                *r -= 1;
                completed = *r == 0;
            }
        });
        completed
    }

    /// Arrivals still missing.
    pub fn remaining(&self) -> usize {
        *self.remaining.borrow()
    }

    /// Resolves once every party has arrived.
    pub async fn wait(&self) {
        let mut rx = self.remaining.subscribe();
        let _ = rx.wait_for(|r| *r == 0).await;
    }
}
