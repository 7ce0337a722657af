//! Node matching: walking the routing tree for one request.
//!
//! A routing tree is built from three node kinds ([`Mount`], [`Page`],
//! [`Redirect`]) and stays immutable once handed to a router. All matching
//! state lives outside the tree, keyed by [`NodeKey`]s the arena assigns
//! from tree positions: per-node request fingerprints, the dependencies of
//! the last built route, and the resolver's cache entries.
//!
//! Executing a node yields a [`MatchOutcome`]. `route: None` means "no
//! match here, try the next pattern"; a returned route is the cached `Arc`
//! whenever the request and every dependency are unchanged since the last
//! pass, which is what gives consumers pointer-stable routes.

mod mount;
mod page;
mod redirect;

pub use mount::{Mount, mount, pattern_is_static};
pub use page::{Page, page};
pub use redirect::{Redirect, redirect, redirect_with};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::core::url::Query;
use crate::core::RouteRequest;
use crate::resolver::{NodeKey, Resolution, ResolutionId, Resolver};
use crate::route::Route;

/// A node of the routing tree.
#[derive(Clone)]
pub enum Node {
    Mount(Mount),
    Page(Page),
    Redirect(Redirect),
}

impl Node {
    pub(crate) fn execute(
        &self,
        key: NodeKey,
        request: &RouteRequest,
        cx: &mut MatchContext<'_>,
    ) -> MatchOutcome {
        match self {
            Node::Mount(mount) => mount.execute(key, request, cx),
            Node::Page(page) => page.execute(key, request, cx),
            Node::Redirect(redirect) => redirect.execute(key, request, cx),
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Mount(mount) => mount.fmt(f),
            Node::Page(page) => page.fmt(f),
            Node::Redirect(redirect) => redirect.fmt(f),
        }
    }
}

impl From<Mount> for Node {
    fn from(mount: Mount) -> Self {
        Self::Mount(mount)
    }
}

impl From<Page> for Node {
    fn from(page: Page) -> Self {
        Self::Page(page)
    }
}

impl From<Redirect> for Node {
    fn from(redirect: Redirect) -> Self {
        Self::Redirect(redirect)
    }
}

/// What executing a node produced.
pub struct MatchOutcome {
    /// `None` when the node does not apply to the remaining path.
    pub route: Option<Arc<Route>>,
    /// Every resolution the outcome depends on, pending ones included.
    pub resolution_ids: SmallVec<[ResolutionId; 4]>,
}

impl MatchOutcome {
    pub(crate) fn no_match() -> Self {
        Self {
            route: None,
            resolution_ids: SmallVec::new(),
        }
    }
}

// ============================================================================
// Node keys
// ============================================================================

/// Assigns stable [`NodeKey`]s from tree positions.
///
/// The root gets a fixed key; every other node is keyed by its parent's key
/// plus its child index, assigned on first visit and remembered for the
/// router's lifetime. Identity therefore follows the tree position, not any
/// object address.
pub(crate) struct NodeArena {
    children: DashMap<(NodeKey, u32), NodeKey>,
    next: AtomicU64,
}

impl NodeArena {
    const ROOT: NodeKey = NodeKey::new(0);

    pub(crate) fn new() -> Self {
        Self {
            children: DashMap::new(),
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn root(&self) -> NodeKey {
        Self::ROOT
    }

    pub(crate) fn child(&self, parent: NodeKey, index: u32) -> NodeKey {
        *self
            .children
            .entry((parent, index))
            .or_insert_with(|| NodeKey::new(self.next.fetch_add(1, Ordering::Relaxed)))
    }
}

// ============================================================================
// Per-node matching state
// ============================================================================

/// A dependency of a built route, compared by pointer.
#[derive(Clone)]
pub(crate) enum Dep {
    Resolution(Arc<Resolution>),
    Child(Arc<Route>),
}

impl Dep {
    fn same(&self, other: &Dep) -> bool {
        match (self, other) {
            (Dep::Resolution(a), Dep::Resolution(b)) => Arc::ptr_eq(a, b),
            (Dep::Child(a), Dep::Child(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

pub(crate) type Deps = SmallVec<[Dep; 4]>;

/// The request shape a node last matched. A change here means the node's
/// resolvables must start over.
#[derive(Clone, PartialEq)]
struct Fingerprint {
    mount_path: String,
    path: String,
    query: Query,
    hash: Option<String>,
}

impl Fingerprint {
    fn of(request: &RouteRequest) -> Self {
        Self {
            mount_path: request.mount_path.clone(),
            path: request.path.clone(),
            query: request.query.clone(),
            hash: request.hash.clone(),
        }
    }
}

struct MatcherState {
    fingerprint: Fingerprint,
    last: Option<LastBuild>,
}

struct LastBuild {
    deps: Deps,
    route: Arc<Route>,
}

/// Request fingerprints and last-built routes for every active node.
pub(crate) struct MatcherStates {
    map: Mutex<FxHashMap<NodeKey, MatcherState>>,
}

impl MatcherStates {
    pub(crate) fn new() -> Self {
        Self {
            map: Mutex::new(FxHashMap::default()),
        }
    }

    /// Record the request a node is matching. When the shape changed since
    /// the last pass, the node's resolver entries and cached route are
    /// dropped so everything recomputes for the new request.
    fn sync_request(&self, key: NodeKey, request: &RouteRequest, resolver: &Resolver) {
        let fingerprint = Fingerprint::of(request);
        let mut map = self.map.lock();
        match map.entry(key) {
            std::collections::hash_map::Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                if state.fingerprint != fingerprint {
                    resolver.invalidate(key);
                    state.fingerprint = fingerprint;
                    state.last = None;
                }
            }
            std::collections::hash_map::Entry::Vacant(vacant) => {
                vacant.insert(MatcherState {
                    fingerprint,
                    last: None,
                });
            }
        }
    }

    /// The cached route, provided every dependency is pointer-identical to
    /// the last build.
    fn cached(&self, key: NodeKey, deps: &[Dep]) -> Option<Arc<Route>> {
        let map = self.map.lock();
        let last = map.get(&key)?.last.as_ref()?;
        let unchanged = last.deps.len() == deps.len()
            && last.deps.iter().zip(deps).all(|(a, b)| a.same(b));
        unchanged.then(|| Arc::clone(&last.route))
    }

    fn store(&self, key: NodeKey, deps: Deps, route: Arc<Route>) {
        let mut map = self.map.lock();
        if let Some(state) = map.get_mut(&key) {
            state.last = Some(LastBuild { deps, route });
        }
    }

    /// Drop state for every node missing from `visited`, returning the
    /// removed keys so their resolver entries can be invalidated too.
    pub(crate) fn sweep(&self, visited: &FxHashSet<NodeKey>) -> Vec<NodeKey> {
        let mut map = self.map.lock();
        let removed: Vec<NodeKey> = map
            .keys()
            .filter(|key| !visited.contains(key))
            .copied()
            .collect();
        for key in &removed {
            map.remove(key);
        }
        removed
    }
}

// ============================================================================
// Match context
// ============================================================================

/// Everything one matching pass threads through the tree.
pub(crate) struct MatchContext<'a> {
    pub(crate) resolver: &'a Resolver,
    pub(crate) states: &'a MatcherStates,
    pub(crate) arena: &'a NodeArena,
    /// Keys that took part in this pass. Anything else is swept afterwards.
    pub(crate) visited: FxHashSet<NodeKey>,
}

impl<'a> MatchContext<'a> {
    pub(crate) fn new(
        resolver: &'a Resolver,
        states: &'a MatcherStates,
        arena: &'a NodeArena,
    ) -> Self {
        Self {
            resolver,
            states,
            arena,
            visited: FxHashSet::default(),
        }
    }

    /// Mark a node active and sync its request fingerprint.
    fn engage(&mut self, key: NodeKey, request: &RouteRequest) {
        self.visited.insert(key);
        self.states.sync_request(key, request, self.resolver);
    }

    /// Cached-route lookup and store, in one create-only-if-changed step.
    fn build_or_cached(
        &mut self,
        key: NodeKey,
        deps: Deps,
        build: impl FnOnce() -> Arc<Route>,
    ) -> Arc<Route> {
        if let Some(route) = self.states.cached(key, &deps) {
            return route;
        }
        let route = build();
        self.states.store(key, deps, Arc::clone(&route));
        route
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_keys_are_stable_per_position() {
        let arena = NodeArena::new();
        let root = arena.root();
        let a = arena.child(root, 0);
        let b = arena.child(root, 1);
        let a_again = arena.child(root, 0);

        assert_eq!(a, a_again);
        assert_ne!(a, b);
        assert_ne!(a, root);
    }

    #[test]
    fn test_arena_nested_children_distinct() {
        let arena = NodeArena::new();
        let root = arena.root();
        let a = arena.child(root, 0);
        let nested = arena.child(a, 0);
        assert_ne!(nested, a);
        assert_eq!(nested, arena.child(a, 0));
    }

    #[test]
    fn test_dep_compare_is_pointer_based() {
        let resolution = Arc::new(Resolution {
            id: 1,
            status: crate::resolver::ResolutionStatus::Ready,
            value: None,
            error: None,
        });
        let same = Dep::Resolution(Arc::clone(&resolution));
        let other = Dep::Resolution(Arc::new(Resolution {
            id: 1,
            status: crate::resolver::ResolutionStatus::Ready,
            value: None,
            error: None,
        }));

        assert!(Dep::Resolution(resolution).same(&same));
        assert!(!same.same(&other));
    }
}
