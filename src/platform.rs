//! # Orchestration platform boundary.
//!
//! The runtime never talks to the cluster directly; it consumes a [`Platform`]
//! implementation that provides:
//! - a filtered **membership feed** per namespace partition ([`Platform::watch`]),
//! - a follow-mode **byte stream** per target ([`Platform::open_log_stream`]),
//! - the **default namespace** when none is configured.
//!
//! All filtering (pod/container patterns, lifecycle state, label selector)
//! happens on the platform side; the runtime only reacts to Added/Removed.
//!
//! ## Feed contract
//! ```text
//! watch(query) ──► BoxStream<MembershipEvent>
//!                    ├─ Added(Target)    ...  emission order per identity
//!                    ├─ Removed(Target)
//!                    └─ end of stream    ──► feed terminated (restart)
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use regex::Regex;
use tokio::io::AsyncRead;

use crate::error::PlatformError;

/// Stable identity of a tail target: `(namespace, pod, container)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId {
    pub namespace: Arc<str>,
    pub pod: Arc<str>,
    pub container: Arc<str>,
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.pod, self.container)
    }
}

/// One taggable log source. Immutable once observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub namespace: Arc<str>,
    pub pod: Arc<str>,
    pub container: Arc<str>,
    pub node: Arc<str>,
}

impl Target {
    pub fn new(
        namespace: impl Into<Arc<str>>,
        pod: impl Into<Arc<str>>,
        container: impl Into<Arc<str>>,
        node: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
            node: node.into(),
        }
    }

    /// Identity key; the node is not part of it.
    pub fn id(&self) -> TargetId {
        TargetId {
            namespace: Arc::clone(&self.namespace),
            pod: Arc::clone(&self.pod),
            container: Arc::clone(&self.container),
        }
    }
}

/// Membership change reported by the watch feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MembershipEvent {
    Added(Target),
    Removed(Target),
}

/// Container lifecycle filter applied by the platform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContainerState {
    #[default]
    Running,
    Waiting,
    Terminated,
    /// Any state.
    All,
}

/// Per-partition watch parameters.
#[derive(Clone, Debug)]
pub struct WatchQuery {
    /// Namespace (`""` = all namespaces).
    pub namespace: String,
    pub pod_query: Regex,
    pub container_query: Regex,
    pub exclude_container_query: Option<Regex>,
    pub init_containers: bool,
    pub container_state: ContainerState,
    pub label_selector: Option<String>,
    /// Server-side watch timeout in seconds.
    pub timeout_secs: Option<i64>,
}

/// Parameters for opening a log stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogStreamOptions {
    pub follow: bool,
    pub timestamps: bool,
    pub since_secs: i64,
    pub tail_lines: Option<i64>,
}

/// Live membership feed. End of stream means the feed terminated.
pub type MembershipFeed = BoxStream<'static, MembershipEvent>;

/// Follow-mode byte stream of one target.
pub type LogStream = Box<dyn AsyncRead + Send + Unpin>;

/// Contract for the orchestration platform collaborator.
///
/// Implementations wrap the platform client (kubeconfig, context, transport).
#[async_trait]
pub trait Platform: Send + Sync + 'static {
    /// Opens a membership feed for one partition.
    async fn watch(&self, query: &WatchQuery) -> Result<MembershipFeed, PlatformError>;

    /// Opens a follow-mode log stream for one target.
    async fn open_log_stream(
        &self,
        target: &Target,
        options: &LogStreamOptions,
    ) -> Result<LogStream, PlatformError>;

    /// Resolves the namespace of the current context.
    async fn default_namespace(&self) -> Result<String, PlatformError>;
}
