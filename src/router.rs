//! The router: owns a routing tree and resolves locations against it.
//!
//! One router holds all the mutable machinery a tree needs: the resolver,
//! per-node matching state, the key arena and the latest route. A matching
//! pass is synchronous; resolvables settle in the background and
//! [`Router::resolve_steady`] loops passes until nothing is pending.
//!
//! Nodes are disposed when a pass no longer reaches them: their matching
//! state is swept and their resolver entries invalidated, so navigating
//! away and back recomputes instead of serving stale data.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::chunk::create_not_found_chunk;
use crate::core::url::Location;
use crate::core::RouteRequest;
use crate::matcher::{MatchContext, MatcherStates, Node, NodeArena};
use crate::resolver::{ResolutionId, Resolver};
use crate::route::{Route, RouteKind};

/// Resolves locations against an immutable routing tree.
///
/// Requires an ambient tokio runtime; resolvables run as spawned tasks.
pub struct Router {
    root: Node,
    context: Value,
    resolver: Resolver,
    states: MatcherStates,
    arena: NodeArena,
    current: ArcSwapOption<Route>,
    /// Serializes steady resolutions so their passes never interleave.
    steady: tokio::sync::Mutex<()>,
    /// Cached not-found route for when the root node itself declines.
    fallback: Mutex<Option<(Location, Arc<Route>)>>,
}

impl Router {
    /// Router with an empty context.
    pub fn new(root: impl Into<Node>) -> Self {
        Self::with_context(root, Value::Null)
    }

    /// Router with an environment value handed to every resolvable.
    pub fn with_context(root: impl Into<Node>, context: Value) -> Self {
        Self {
            root: root.into(),
            context,
            resolver: Resolver::new(),
            states: MatcherStates::new(),
            arena: NodeArena::new(),
            current: ArcSwapOption::from(None),
            steady: tokio::sync::Mutex::new(()),
            fallback: Mutex::new(None),
        }
    }

    /// Run one matching pass for a location.
    ///
    /// Returns immediately with whatever is known right now; the route may
    /// be busy. Matching an unchanged location against unchanged
    /// resolutions returns the previous `Arc<Route>` untouched.
    pub fn resolve(&self, location: impl Into<Location>) -> Arc<Route> {
        let location = location.into();
        let request = RouteRequest::root(&location, self.context.clone());
        let mut cx = MatchContext::new(&self.resolver, &self.states, &self.arena);
        let outcome = self.root.execute(self.arena.root(), &request, &mut cx);

        let route = match outcome.route {
            Some(route) => route,
            None => self.fallback_route(&location, &request),
        };

        // Dispose everything the pass did not reach.
        for key in self.states.sweep(&cx.visited) {
            self.resolver.invalidate(key);
        }

        self.current.store(Some(Arc::clone(&route)));
        route
    }

    /// Resolve and wait until no segment is busy.
    ///
    /// Re-runs the pass whenever a pending resolution settles. Concurrent
    /// steady resolutions are serialized; the router's `current()` ends up
    /// at the route of whichever call finished last.
    pub async fn resolve_steady(&self, location: impl Into<Location>) -> Arc<Route> {
        let location = location.into();
        let _serial = self.steady.lock().await;
        let mut events = self.resolver.subscribe();
        loop {
            let route = self.resolve(&location);
            let pending = route.pending_resolution_ids();
            if pending.is_empty() {
                return route;
            }
            loop {
                match events.recv().await {
                    Ok(id) if pending.contains(&id) => break,
                    Ok(_) => continue,
                    // Missed events: re-run the pass to observe the cache.
                    Err(broadcast::error::RecvError::Lagged(_)) => break,
                    Err(broadcast::error::RecvError::Closed) => return route,
                }
            }
        }
    }

    /// The route of the most recent pass, if any.
    pub fn current(&self) -> Option<Arc<Route>> {
        self.current.load_full()
    }

    /// Settlement events: each carries the id of a superseded pending
    /// resolution. Useful for driving custom steady loops or UI updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ResolutionId> {
        self.resolver.subscribe()
    }

    /// The environment value resolvables receive.
    pub fn context(&self) -> &Value {
        &self.context
    }

    fn fallback_route(&self, location: &Location, request: &RouteRequest) -> Arc<Route> {
        let mut slot = self.fallback.lock();
        if let Some((cached, route)) = slot.as_ref()
            && cached == location
        {
            return Arc::clone(route);
        }
        let chunk = create_not_found_chunk(request);
        let url = chunk.url.clone();
        let route = Route::assemble(RouteKind::page(), url, vec![chunk], vec![]);
        *slot = Some((location.clone(), Arc::clone(&route)));
        route
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").field("root", &self.root).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use crate::error::RouteError;
    use crate::matcher::{mount, page, redirect};
    use crate::route::RouteStatus;

    fn site() -> Router {
        Router::new(
            mount()
                .at("/", page().title("Home").view("home.html"))
                .at(
                    "/about",
                    page()
                        .title("About")
                        .data_with(|_request| async { Ok(json!({"team": 3})) }),
                )
                .at("/old", redirect("/about")),
        )
    }

    #[tokio::test]
    async fn test_steady_resolution_of_async_page() {
        let router = site();
        let route = router.resolve_steady("/about").await;

        assert_eq!(route.status, RouteStatus::Ready);
        assert!(route.is_steady());
        assert_eq!(route.leaf().title(), Some("About"));
        match &route.leaf().kind {
            RouteKind::Page { data, .. } => assert_eq!(data, &json!({"team": 3})),
            _ => panic!("expected page leaf"),
        }

        let current = router.current().unwrap();
        assert!(Arc::ptr_eq(&route, &current));
    }

    #[tokio::test]
    async fn test_unchanged_location_keeps_route_identity() {
        let router = site();
        let first = router.resolve_steady("/about").await;
        let second = router.resolve_steady("/about").await;
        assert!(Arc::ptr_eq(&first, &second));

        // A plain pass reuses it too.
        let third = router.resolve("/about");
        assert!(Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn test_navigating_away_disposes_and_recomputes() {
        let counter = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&counter);
        let router = Router::new(
            mount()
                .at("/", page().title("Home"))
                .at(
                    "/posts",
                    page().data_with(move |_request| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async { Ok(json!([1, 2])) }
                    }),
                ),
        );

        let first = router.resolve_steady("/posts").await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        router.resolve_steady("/").await;

        let again = router.resolve_steady("/posts").await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(!Arc::ptr_eq(&first, &again));
        assert_eq!(again.status, RouteStatus::Ready);
    }

    #[tokio::test]
    async fn test_redirect_resolves_to_target_location() {
        let router = site();
        let route = router.resolve_steady("/old").await;
        assert_eq!(
            route.redirect_target().map(|l| l.pathname.as_str()),
            Some("/about")
        );
    }

    #[tokio::test]
    async fn test_unmatched_location_is_error_route() {
        let router = site();
        let route = router.resolve_steady("/nope").await;
        assert_eq!(route.status, RouteStatus::Error);
        assert_eq!(
            route.first_error(),
            Some(&RouteError::NotFound("/nope".to_string()))
        );
    }

    #[tokio::test]
    async fn test_root_leaf_decline_uses_fallback() {
        let router = Router::new(page().title("Only root"));
        let route = router.resolve_steady("/somewhere").await;
        assert_eq!(route.status, RouteStatus::Error);
        assert_eq!(
            route.first_error(),
            Some(&RouteError::NotFound("/somewhere".to_string()))
        );

        // The fallback is cached per location.
        let again = router.resolve("/somewhere");
        assert!(Arc::ptr_eq(&route, &again));
    }

    #[tokio::test]
    async fn test_context_reaches_resolvables() {
        let router = Router::with_context(
            mount().at(
                "/",
                page().title_with(|request| async move {
                    let name = request.context["site"].as_str().unwrap_or("?");
                    Ok(format!("Welcome to {name}"))
                }),
            ),
            json!({"site": "portolan"}),
        );

        let route = router.resolve_steady("/").await;
        assert_eq!(route.leaf().title(), Some("Welcome to portolan"));
    }

    #[tokio::test]
    async fn test_concurrent_steady_calls_serialize() {
        let router = Arc::new(site());
        let a = {
            let router = Arc::clone(&router);
            async move { router.resolve_steady("/about").await }
        };
        let b = {
            let router = Arc::clone(&router);
            async move { router.resolve_steady("/").await }
        };
        let (about, home) = tokio::join!(a, b);

        assert_eq!(about.leaf().title(), Some("About"));
        assert_eq!(home.leaf().title(), Some("Home"));

        // Whichever finished last owns `current`.
        let current = router.current().unwrap();
        assert!(Arc::ptr_eq(&current, &home) || Arc::ptr_eq(&current, &about));
    }
}
