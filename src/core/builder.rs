use std::sync::Arc;

use super::supervisor::{BoxWriter, Supervisor};
use crate::{
    config::Config,
    events::Bus,
    output::Render,
    platform::Platform,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Supervisor`] with optional features.
pub struct SupervisorBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    writers: Option<(BoxWriter, BoxWriter)>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            writers: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (tail lifecycle, restarts, sink
    /// retries) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the process stdout/stderr as output destinations.
    pub fn with_writers(mut self, stdout: BoxWriter, stderr: BoxWriter) -> Self {
        self.writers = Some((stdout, stderr));
        self
    }

    /// Builds the supervisor.
    ///
    /// Spawns the subscriber workers, so it must be called inside a Tokio runtime.
    pub fn build(self, platform: Arc<dyn Platform>, renderer: Arc<dyn Render>) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());

        Arc::new(Supervisor::new_internal(
            self.cfg,
            bus,
            subs,
            platform,
            renderer,
            self.writers,
        ))
    }
}
