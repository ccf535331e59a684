//! Runtime core: partitions, restart coordination and shutdown.
//!
//! The public API from this module is [`Supervisor`] (and its builder), which
//! drives run cycles across namespace partitions.
//!
//! Internal modules:
//! - [`supervisor`]: cycle loop, sink setup, output consumer, subscriber fan-out;
//! - [`adapter`]: applies one partition's membership feed to its registry;
//! - [`barrier`]: countdown that holds restarts until every partition's feed ended;
//! - [`builder`]: assembles a supervisor;
//! - [`shutdown`]: cross-platform termination signal handling.

mod adapter;
mod barrier;
mod builder;
mod shutdown;
mod supervisor;

pub use adapter::{FeedEnd, MembershipAdapter};
pub use barrier::RestartBarrier;
pub use builder::SupervisorBuilder;
pub use supervisor::{BoxWriter, Supervisor};
