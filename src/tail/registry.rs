//! # Tail registry: at most one live worker per identity.
//!
//! The registry reacts to membership changes of one partition:
//! - `handle_added(target)`   → spawn a worker unless a live one exists
//! - `handle_removed(target)` → evict and cancel the worker, if any
//! - `drain_all()`            → cancel every worker and wait for all of them
//!
//! ## Architecture
//! ```text
//! MembershipAdapter
//!     ├─► Added(t)   ──► handle_added ──► [lock] lookup(t.id)
//!     │                                     ├─ live (Starting/Active) → AlreadyLive (no-op)
//!     │                                     ├─ Closed                 → retire old, spawn → Replaced
//!     │                                     └─ absent                 → spawn → Started
//!     └─► Removed(t) ──► handle_removed ──► [lock] take(t.id) → cancel → retire
//! ```
//!
//! ## Rules
//! - Check-and-insert happens under one lock, so two concurrent Added events
//!   for the same identity spawn exactly one worker.
//! - Nothing waits on a worker while the lock is held.
//! - Evicted workers are retired, not forgotten: `drain_all` joins them too.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};
use crate::platform::{Target, TargetId};
use crate::tail::worker::{self, TailContext, TailHandle};

/// Result of [`TailRegistry::handle_added`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// No entry existed; a worker was spawned.
    Started,
    /// A closed worker was replaced by a fresh one.
    Replaced,
    /// A live worker already exists; nothing changed.
    AlreadyLive,
}

#[derive(Default)]
struct Entries {
    tails: HashMap<TargetId, TailHandle>,
    retired: Vec<(TargetId, JoinHandle<()>)>,
}

impl Entries {
    fn retire(&mut self, id: TargetId, handle: TailHandle) {
        self.retired.retain(|(_, j)| !j.is_finished());
        self.retired.push((id, handle.into_join()));
    }
}

/// Per-partition registry of tail workers.
pub struct TailRegistry {
    entries: Mutex<Entries>,
    ctx: TailContext,
    token: CancellationToken,
}

impl TailRegistry {
    /// Creates a registry; workers get child tokens of `token`.
    pub fn new(ctx: TailContext, token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Entries::default()),
            ctx,
            token,
        })
    }

    fn bus(&self) -> &Bus {
        &self.ctx.bus
    }

    /// Ensures a live worker exists for `target`.
    pub async fn handle_added(&self, target: Target) -> AddOutcome {
        let id = target.id();
        let mut entries = self.entries.lock().await;

        let outcome = match entries.tails.get(&id).map(TailHandle::state) {
            Some(state) if state.is_live() => {
                drop(entries);
                self.bus().publish(
                    Event::tail(EventKind::DuplicateIgnored, &id)
                        .with_partition(Arc::clone(&target.namespace)),
                );
                return AddOutcome::AlreadyLive;
            }
            Some(_) => {
                if let Some(old) = entries.tails.remove(&id) {
                    entries.retire(id.clone(), old);
                }
                AddOutcome::Replaced
            }
            None => AddOutcome::Started,
        };

        let partition = Arc::clone(&target.namespace);
        let handle = worker::spawn(&self.ctx, target, self.token.child_token());
        entries.tails.insert(id.clone(), handle);
        drop(entries);

        if outcome == AddOutcome::Replaced {
            self.bus()
                .publish(Event::tail(EventKind::TailReplaced, &id).with_partition(partition));
        }
        outcome
    }

    /// Evicts and cancels the worker for `target`; returns false if none existed.
    pub async fn handle_removed(&self, target: &Target) -> bool {
        let id = target.id();
        let mut entries = self.entries.lock().await;
        let Some(handle) = entries.tails.remove(&id) else {
            return false;
        };
        handle.cancel();
        entries.retire(id.clone(), handle);
        drop(entries);

        self.bus().publish(
            Event::tail(EventKind::TailRemoved, &id)
                .with_partition(Arc::clone(&target.namespace)),
        );
        true
    }

    /// Cancels every worker and waits until all of them, retired ones included, have exited.
    pub async fn drain_all(&self) {
        let joins: Vec<(TargetId, JoinHandle<()>)> = {
            let mut entries = self.entries.lock().await;
            let mut joins: Vec<_> = entries
                .tails
                .drain()
                .map(|(id, h)| {
                    h.cancel();
                    (id, h.into_join())
                })
                .collect();
            joins.append(&mut entries.retired);
            joins
        };

        for (id, join) in joins {
            if let Err(e) = join.await {
                let reason = if e.is_panic() {
                    "worker_panic"
                } else {
                    "worker_aborted"
                };
                self.bus().publish(
                    Event::tail(EventKind::TailClosed, &id)
                        .with_reason(reason)
                        .with_partition(Arc::clone(&id.namespace)),
                );
            }
        }
    }

    /// Identities with a live worker, sorted.
    pub async fn live(&self) -> Vec<TargetId> {
        let entries = self.entries.lock().await;
        let mut ids: Vec<TargetId> = entries
            .tails
            .iter()
            .filter(|(_, h)| h.state().is_live())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort_unstable();
        ids
    }
}
