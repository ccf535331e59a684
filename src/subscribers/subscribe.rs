//! # Subscriber trait
//!
//! `Subscribe` plugs custom observers (metrics, audit, alerting) into the
//! runtime. Each subscriber gets its own worker task and bounded queue inside
//! the [`SubscriberSet`](crate::subscribers::SubscriberSet).
//!
//! ## Contract
//! - A slow subscriber only delays itself; publishers and other subscribers keep going.
//! - On queue overflow the event is dropped for that subscriber and a
//!   `SubscriberOverflow` event is published.
//!
//! ## Example
//! ```rust
//! use tailvisor::{Event, EventKind, Subscribe};
//!
//! struct CountClosed(std::sync::atomic::AtomicU64);
//!
//! #[async_trait::async_trait]
//! impl Subscribe for CountClosed {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::TailClosed {
//!             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "count-closed" }
//! }
//! ```

use crate::events::Event;
use async_trait::async_trait;

/// Contract for event subscribers.
///
/// Called from a subscriber-dedicated worker task. Implementations should avoid
/// blocking the async runtime.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single event for this subscriber.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs/metrics).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
