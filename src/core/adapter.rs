//! # Membership adapter: one partition's watch feed → registry calls.
//!
//! ```text
//! feed ──► Added(t)   ──► registry.handle_added(t)
//!      ──► Removed(t) ──► registry.handle_removed(t)
//!      ──► end        ──► PartitionRestartRequested ──► barrier.arrive() ──► stop
//! ```
//!
//! Events are applied one at a time in emission order. The adapter never
//! re-watches; the supervisor does, after the barrier completes.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::core::barrier::RestartBarrier;
use crate::events::{Bus, Event, EventKind};
use crate::platform::{MembershipEvent, MembershipFeed};
use crate::tail::TailRegistry;

/// Why an adapter stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedEnd {
    /// The feed terminated; a restart was requested.
    Terminated,
    /// The cycle was cancelled first.
    Cancelled,
}

pub struct MembershipAdapter {
    namespace: Arc<str>,
    registry: Arc<TailRegistry>,
    bus: Bus,
}

impl MembershipAdapter {
    pub fn new(namespace: &str, registry: Arc<TailRegistry>, bus: Bus) -> Self {
        Self {
            namespace: Arc::from(namespace),
            registry,
            bus,
        }
    }

    /// Applies `feed` until it ends or `cancel` fires.
    ///
    /// A cancelled adapter does not arrive at the barrier.
    pub async fn run(
        self,
        mut feed: MembershipFeed,
        barrier: RestartBarrier,
        cancel: CancellationToken,
    ) -> FeedEnd {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return FeedEnd::Cancelled,
                ev = feed.next() => ev,
            };
            match next {
                Some(MembershipEvent::Added(target)) => {
                    self.registry.handle_added(target).await;
                }
                Some(MembershipEvent::Removed(target)) => {
                    self.registry.handle_removed(&target).await;
                }
                None => break,
            }
        }

        barrier.arrive();
        tracing::debug!(
            namespace = %self.namespace,
            remaining = barrier.remaining(),
            "membership feed terminated"
        );
        self.bus.publish(
            Event::new(EventKind::PartitionRestartRequested)
                .with_partition(Arc::clone(&self.namespace))
                .with_remaining(barrier.remaining() as u32),
        );
        FeedEnd::Terminated
    }
}
