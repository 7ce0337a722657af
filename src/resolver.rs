//! Async resolution cache with stable object identity.
//!
//! Nodes hand the resolver a [`Resolvable`] keyed by `(node, slot)`. The
//! first call spawns the future and returns a busy [`Resolution`]; every
//! call after that returns the exact same `Arc` until the future settles,
//! at which point a new `Arc` with a fresh id is installed and an event is
//! broadcast naming the superseded id. Matchers compare resolutions by
//! pointer, so "same `Arc`" is what lets them reuse cached routes.
//!
//! Invalidation removes the entry and aborts the in-flight future. A
//! settlement arriving for a removed or re-created entry is dropped by a
//! generation check: last writer for the *current* generation wins, stale
//! generations lose.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use smallvec::SmallVec;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use crate::chunk::Headers;
use crate::core::url::Location;
use crate::core::RouteRequest;
use crate::error::RouteError;

/// Monotonic token distinguishing resolution objects.
pub type ResolutionId = u64;

/// Identity of a node in the routing tree, assigned by the router's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(u64);

impl NodeKey {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Which resolvable of a node, for nodes carrying more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot(pub u16);

/// Cache key for one resolvable: the node it belongs to plus its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolutionKey {
    pub node: NodeKey,
    pub slot: Slot,
}

impl ResolutionKey {
    pub const fn new(node: NodeKey, slot: Slot) -> Self {
        Self { node, slot }
    }
}

// ============================================================================
// Resolution values
// ============================================================================

/// A successfully resolved value, tagged by what it feeds.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Title(String),
    View(String),
    Data(Value),
    Head(String),
    Headers(Headers),
    Status(u16),
    Redirect(Location),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStatus {
    Busy,
    Ready,
    Error,
}

/// One observation of a resolvable's progress.
///
/// Handed out as `Arc<Resolution>`; two observations describe the same
/// outcome exactly when the `Arc`s are pointer-equal. A new object (with a
/// larger `id`) appears only when the status or value actually changed.
#[derive(Debug)]
pub struct Resolution {
    pub id: ResolutionId,
    pub status: ResolutionStatus,
    pub value: Option<Resolved>,
    pub error: Option<RouteError>,
}

impl Resolution {
    fn busy(id: ResolutionId) -> Self {
        Self {
            id,
            status: ResolutionStatus::Busy,
            value: None,
            error: None,
        }
    }

    fn settled(id: ResolutionId, outcome: Result<Resolved, RouteError>) -> Self {
        match outcome {
            Ok(value) => Self {
                id,
                status: ResolutionStatus::Ready,
                value: Some(value),
                error: None,
            },
            Err(error) => Self {
                id,
                status: ResolutionStatus::Error,
                value: None,
                error: Some(error),
            },
        }
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        self.status == ResolutionStatus::Busy
    }
}

// ============================================================================
// Resolvables
// ============================================================================

/// Boxed future produced by a resolvable.
pub type ResolvableFuture = Pin<Box<dyn Future<Output = Result<Resolved, RouteError>> + Send>>;

/// A deferred computation the resolver can run for a request.
///
/// Shared (`Arc`) because the same node definition is executed for many
/// requests over the router's lifetime.
pub type Resolvable = Arc<dyn Fn(RouteRequest) -> ResolvableFuture + Send + Sync>;

/// Resolvable that completes immediately with a fixed value.
pub fn constant(value: Resolved) -> Resolvable {
    Arc::new(move |_request| {
        let value = value.clone();
        Box::pin(async move { Ok(value) })
    })
}

/// Wrap an async function of the request into a resolvable.
pub fn resolvable<F, Fut>(f: F) -> Resolvable
where
    F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resolved, RouteError>> + Send + 'static,
{
    Arc::new(move |request| Box::pin(f(request)))
}

// ============================================================================
// Resolver
// ============================================================================

struct ResolverEntry {
    generation: u64,
    resolution: Arc<Resolution>,
    tasks: SmallVec<[AbortHandle; 2]>,
}

struct ResolverShared {
    entries: DashMap<ResolutionKey, ResolverEntry>,
    generations: DashMap<NodeKey, u64>,
    next_id: AtomicU64,
    events: broadcast::Sender<ResolutionId>,
}

/// The shared resolution cache. Cheap to clone.
///
/// Requires an ambient tokio runtime: resolvables are spawned as tasks.
#[derive(Clone)]
pub struct Resolver {
    shared: Arc<ResolverShared>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(ResolverShared {
                entries: DashMap::new(),
                generations: DashMap::new(),
                next_id: AtomicU64::new(1),
                events,
            }),
        }
    }

    /// Get or start the resolution for `key`.
    ///
    /// Synchronous: a cache hit returns the stored `Arc` untouched, a miss
    /// installs a busy resolution and spawns the resolvable's future. The
    /// pointer returned stays stable until the future settles or the key
    /// is invalidated.
    pub fn resolve(
        &self,
        key: ResolutionKey,
        resolvable: &Resolvable,
        request: &RouteRequest,
    ) -> Arc<Resolution> {
        if let Some(entry) = self.shared.entries.get(&key) {
            return Arc::clone(&entry.resolution);
        }

        let generation = self.shared.generation(key.node);
        let busy = Arc::new(Resolution::busy(self.shared.next_id()));

        // Install before spawning so a racing resolve sees the same object.
        match self.shared.entries.entry(key) {
            Entry::Occupied(occupied) => return Arc::clone(&occupied.get().resolution),
            Entry::Vacant(vacant) => {
                vacant.insert(ResolverEntry {
                    generation,
                    resolution: Arc::clone(&busy),
                    tasks: SmallVec::new(),
                });
            }
        }

        let future = (resolvable)(request.clone());
        let shared = Arc::clone(&self.shared);
        let superseded = busy.id;

        // Run the user future as its own task so a panic inside it reaches
        // the settle task as a join error instead of a missing settlement.
        let inner = tokio::spawn(future);
        let inner_abort = inner.abort_handle();
        let settle = tokio::spawn(async move {
            let outcome = match inner.await {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => return,
                Err(err) => Err(RouteError::Resolve(format!("resolvable failed: {err}"))),
            };
            shared.settle(key, generation, superseded, outcome);
        });

        if let Some(mut entry) = self.shared.entries.get_mut(&key) {
            entry.tasks.push(inner_abort);
            entry.tasks.push(settle.abort_handle());
        }

        busy
    }

    /// Drop every resolution belonging to `node` and abort its in-flight
    /// futures. Called when a node leaves the active match or its request
    /// changed shape.
    pub fn invalidate(&self, node: NodeKey) {
        self.shared.bump_generation(node);
        let keys: Vec<ResolutionKey> = self
            .shared
            .entries
            .iter()
            .filter(|entry| entry.key().node == node)
            .map(|entry| *entry.key())
            .collect();
        for key in keys {
            if let Some((_, entry)) = self.shared.entries.remove(&key) {
                for task in entry.tasks {
                    task.abort();
                }
            }
        }
    }

    /// Listen for settlements. Each event names the id of the busy
    /// resolution that was superseded, so holders of pending ids know
    /// when to look again.
    pub fn subscribe(&self) -> broadcast::Receiver<ResolutionId> {
        self.shared.events.subscribe()
    }
}

impl ResolverShared {
    fn next_id(&self) -> ResolutionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn generation(&self, node: NodeKey) -> u64 {
        *self.generations.entry(node).or_insert(0)
    }

    fn bump_generation(&self, node: NodeKey) {
        *self.generations.entry(node).or_insert(0) += 1;
    }

    fn settle(
        &self,
        key: ResolutionKey,
        generation: u64,
        superseded: ResolutionId,
        outcome: Result<Resolved, RouteError>,
    ) {
        {
            let Some(mut entry) = self.entries.get_mut(&key) else {
                // Disposed while the future ran.
                return;
            };
            if entry.generation != generation {
                // A newer computation owns this key now.
                return;
            }
            entry.resolution = Arc::new(Resolution::settled(self.next_id(), outcome));
            entry.tasks.clear();
        }
        // Guard dropped before broadcasting.
        let _ = self.events.send(superseded);
    }
}
