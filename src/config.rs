//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for a tailing run, and
//! [`ForwardConfig`] for the optional forwarding sink.
//!
//! Config is consumed in three places:
//! 1. **Supervisor**: partition list, restart since-window, queue capacities.
//! 2. **Membership watch**: [`Config::watch_query`] builds the per-partition query.
//! 3. **Tail workers**: [`Config::tail_options`] snapshots the per-cycle options.
//!
//! ## Sentinel values
//! - `tail_lines = None` → unbounded backlog
//! - `namespaces = []` and `all_namespaces = false` → platform default namespace
//! - `all_namespaces = true` → a single partition with the empty namespace filter
//! - `client_timeout = 0s` → no server-side watch timeout

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use crate::error::RenderError;
use crate::output::{self, TemplateRenderer};
use crate::platform::{ContainerState, LogStreamOptions, WatchQuery};
use crate::policies::BackoffPolicy;
use crate::tail::LineFilter;

/// Global configuration for a tailing run.
///
/// ## Notes
/// All fields are public for flexibility. Prefer using helper accessors to avoid
/// sprinkling sentinel checks across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Path to the kubeconfig file (`None` = platform default lookup).
    ///
    /// Not read by the runtime. Hosts pass it through when they construct
    /// their [`Platform`](crate::Platform) client.
    pub kubeconfig: Option<PathBuf>,
    /// Kubeconfig context name.
    pub context_name: Option<String>,
    /// Cluster name reported as the forwarding `host`.
    pub cluster_name: Option<String>,

    /// Namespaces to watch; entries may be comma-separated lists.
    pub namespaces: Vec<String>,
    /// Watch every namespace (overrides `namespaces`).
    pub all_namespaces: bool,

    /// Workload (pod) name pattern.
    pub pod_query: Regex,
    /// Container name include pattern.
    pub container_query: Regex,
    /// Container name exclude pattern.
    pub exclude_container_query: Option<Regex>,
    /// Include init containers.
    pub init_containers: bool,
    /// Container lifecycle filter.
    pub container_state: ContainerState,
    /// Label selector passed through to the watch.
    pub label_selector: Option<String>,
    /// Server-side watch timeout.
    pub client_timeout: Duration,

    /// Ask the platform to prefix lines with timestamps.
    pub timestamps: bool,
    /// History window requested on the first cycle.
    pub since: Duration,
    /// History window requested after a coordinated restart.
    pub restart_since: Duration,
    /// Backlog line limit (`None` = unbounded).
    pub tail_lines: Option<i64>,

    /// Lines matching any of these are dropped.
    pub exclude: Vec<Regex>,
    /// When non-empty, only lines matching one of these survive.
    pub include: Vec<Regex>,

    /// Output template (see [`TemplateRenderer`](crate::TemplateRenderer)).
    pub template: String,
    /// Colourize markers and template fields.
    pub color: bool,

    /// Capacity of the shared output queue.
    pub output_capacity: usize,
    /// Capacity of the event bus ring buffer.
    pub bus_capacity: usize,

    /// Optional forwarding sink; when set, lines go to it instead of stdout.
    pub forward: Option<ForwardConfig>,
}

impl Config {
    /// Returns the namespaces as written (comma-separated entries are split, blanks dropped).
    ///
    /// `all_namespaces` yields a single empty namespace.
    /// An empty result means "ask the platform for its default".
    pub fn namespace_list(&self) -> Vec<String> {
        if self.all_namespaces {
            return vec![String::new()];
        }
        self.namespaces
            .iter()
            .flat_map(|ns| ns.split(','))
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Returns true if markers should carry the namespace.
    #[inline]
    pub fn show_namespace(&self) -> bool {
        self.all_namespaces || self.namespace_list().len() > 1
    }

    /// Returns the tail-line limit, treating negative values as unbounded.
    #[inline]
    pub fn tail_lines_limit(&self) -> Option<i64> {
        self.tail_lines.filter(|n| *n >= 0)
    }

    /// Returns the watch timeout in whole seconds (`None` = no timeout).
    #[inline]
    pub fn watch_timeout_secs(&self) -> Option<i64> {
        match self.client_timeout.as_secs() {
            0 => None,
            n => Some(n as i64),
        }
    }

    /// Returns an output queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn output_capacity_clamped(&self) -> usize {
        self.output_capacity.max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Host name reported to the forwarding endpoint.
    ///
    /// Cluster name, then context name, then `"default"`.
    pub fn forward_host(&self) -> String {
        self.cluster_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.context_name.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or("default")
            .to_owned()
    }

    /// Builds the membership query for one partition.
    pub fn watch_query(&self, namespace: &str) -> WatchQuery {
        WatchQuery {
            namespace: namespace.to_owned(),
            pod_query: self.pod_query.clone(),
            container_query: self.container_query.clone(),
            exclude_container_query: self.exclude_container_query.clone(),
            init_containers: self.init_containers,
            container_state: self.container_state,
            label_selector: self.label_selector.clone(),
            timeout_secs: self.watch_timeout_secs(),
        }
    }

    /// Parses [`Config::template`] into the default renderer.
    pub fn renderer(&self) -> Result<TemplateRenderer, RenderError> {
        TemplateRenderer::parse(&self.template)
    }

    /// Snapshots the options handed to every worker of one run cycle.
    pub fn tail_options(&self, since: Duration) -> Arc<TailOptions> {
        Arc::new(TailOptions {
            stream: LogStreamOptions {
                follow: true,
                timestamps: self.timestamps,
                since_secs: since.as_secs().max(1) as i64,
                tail_lines: self.tail_lines_limit(),
            },
            filter: LineFilter::new(self.exclude.clone(), self.include.clone()),
            show_namespace: self.show_namespace(),
            color: self.color,
        })
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - every pod and container, running containers only
    /// - `since = 48h`, `restart_since = 1s`, unbounded backlog
    /// - template `{pod} {container} {message}`, colour on
    /// - `output_capacity = 1024`, `bus_capacity = 1024`
    /// - no forwarding
    fn default() -> Self {
        Self {
            kubeconfig: None,
            context_name: None,
            cluster_name: None,
            namespaces: Vec::new(),
            all_namespaces: false,
            pod_query: match_all(),
            container_query: match_all(),
            exclude_container_query: None,
            init_containers: true,
            container_state: ContainerState::Running,
            label_selector: None,
            client_timeout: Duration::ZERO,
            timestamps: false,
            since: Duration::from_secs(48 * 60 * 60),
            restart_since: Duration::from_secs(1),
            tail_lines: None,
            exclude: Vec::new(),
            include: Vec::new(),
            template: "{pod} {container} {message}".to_owned(),
            color: true,
            output_capacity: output::DEFAULT_CAPACITY,
            bus_capacity: 1024,
            forward: None,
        }
    }
}

fn match_all() -> Regex {
    Regex::new(".*").unwrap_or_else(|_| unreachable!(".* is a valid pattern"))
}

/// Per-cycle options shared by all workers of a run cycle.
#[derive(Clone, Debug)]
pub struct TailOptions {
    /// Parameters for opening the follow-mode stream.
    pub stream: LogStreamOptions,
    /// Line include/exclude patterns.
    pub filter: LineFilter,
    /// Prefix markers with the namespace.
    pub show_namespace: bool,
    /// Colourize markers.
    pub color: bool,
}

/// Forwarding sink configuration.
///
/// ## Field semantics
/// - `retries`: connection attempts allowed at startup (min 1)
/// - `backoff`: delay between startup attempts
/// - `max_reconnect` / `reconnect_delay`: transport reconnect parameters after startup
#[derive(Clone, Debug)]
pub struct ForwardConfig {
    /// Endpoint address (`host:port`).
    pub address: String,
    /// Startup connection attempt budget.
    pub retries: u32,
    /// Delay growth between startup attempts.
    pub backoff: BackoffPolicy,
    /// Per-attempt connect deadline.
    pub connect_timeout: Duration,
    /// Reconnect attempts per message once running.
    pub max_reconnect: u32,
    /// Delay between reconnect attempts once running.
    pub reconnect_delay: Duration,
    /// Capacity of the forwarder's record queue.
    pub queue_capacity: usize,
}

impl ForwardConfig {
    /// Creates a forwarding config for `address` with defaults.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            retries: 10,
            backoff: BackoffPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            max_reconnect: 30,
            reconnect_delay: Duration::from_secs(5),
            queue_capacity: 1024,
        }
    }

    /// Set the startup retry budget.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the startup backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns the retry budget clamped to a minimum of 1.
    #[inline]
    pub fn retries_clamped(&self) -> u32 {
        self.retries.max(1)
    }
}
