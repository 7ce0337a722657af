//! Leaf node that sends resolution elsewhere.
//!
//! The target can be fixed (a string or location, known up front) or a
//! function of the matched request. Either way it goes through the
//! resolver, so a slow dynamic target shows up as a busy route first and
//! the finished route always carries a structured [`Location`], never a
//! raw string.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use smallvec::smallvec;

use crate::chunk::{ChunkKind, create_chunk};
use crate::core::url::Location;
use crate::core::RouteRequest;
use crate::error::RouteError;
use crate::matcher::page::resolved_chunk_kind;
use crate::matcher::{Dep, Deps, MatchContext, MatchOutcome};
use crate::resolver::{NodeKey, ResolutionKey, Resolvable, Resolved, Slot, constant, resolvable};
use crate::route::{Route, RouteKind};

const TO: Slot = Slot(0);

/// Redirect to a fixed target. String targets are parsed into a
/// structured location up front.
pub fn redirect(to: impl Into<Location>) -> Redirect {
    let to = to.into();
    Redirect {
        descriptor: Some(to.href()),
        to: constant(Resolved::Redirect(to)),
    }
}

/// Redirect to a target computed from the request. The request's
/// `mount_location()` is the location this node matched at; anything
/// convertible into a [`Location`] (including path strings) can be
/// returned.
pub fn redirect_with<F, Fut, T>(f: F) -> Redirect
where
    F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, RouteError>> + Send + 'static,
    T: Into<Location>,
{
    Redirect {
        descriptor: None,
        to: resolvable(move |request| {
            let fut = f(request);
            async move { fut.await.map(|to| Resolved::Redirect(to.into())) }
        }),
    }
}

/// A redirect leaf. Matches only when the remaining path is exhausted.
#[derive(Clone)]
pub struct Redirect {
    to: Resolvable,
    /// Fixed target for Debug output; `None` for computed targets.
    descriptor: Option<String>,
}

impl Redirect {
    pub(crate) fn execute(
        &self,
        key: NodeKey,
        request: &RouteRequest,
        cx: &mut MatchContext<'_>,
    ) -> MatchOutcome {
        if !request.is_exhausted() {
            return MatchOutcome::no_match();
        }
        cx.engage(key, request);

        let resolution = cx
            .resolver
            .resolve(ResolutionKey::new(key, TO), &self.to, request);
        let ids = smallvec![resolution.id];
        let deps: Deps = smallvec![Dep::Resolution(Arc::clone(&resolution))];

        let route = cx.build_or_cached(key, deps, || {
            // Redirect chunks keep the matched path literal.
            let chunk = if let Some(value) = &resolution.value {
                create_chunk(request, resolved_chunk_kind(value.clone()), false)
            } else if let Some(error) = &resolution.error {
                create_chunk(
                    request,
                    ChunkKind::Error {
                        error: error.clone(),
                    },
                    false,
                )
            } else {
                create_chunk(
                    request,
                    ChunkKind::Busy {
                        resolution: resolution.id,
                    },
                    false,
                )
            };
            Route::assemble(
                RouteKind::Redirect { to: None },
                request.mount_url(),
                vec![chunk],
                vec![],
            )
        });

        MatchOutcome {
            route: Some(route),
            resolution_ids: ids,
        }
    }
}

impl fmt::Debug for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.descriptor {
            Some(to) => write!(f, "Redirect({to})"),
            None => write!(f, "Redirect(<computed>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::matcher::Node;
    use crate::matcher::testing::{Harness, request, settle_all};
    use crate::route::RouteStatus;

    #[test]
    fn test_leftover_path_does_not_match() {
        let harness = Harness::new();
        let node: Node = redirect("/login").into();
        let outcome = harness.run(&node, &request("/foo"));
        assert!(outcome.route.is_none());
    }

    #[tokio::test]
    async fn test_string_target_becomes_structured_location() {
        let harness = Harness::new();
        let node: Node = redirect("/login?from=home").into();
        let mut events = harness.resolver.subscribe();

        let first = harness.run(&node, &request("/"));
        settle_all(&mut events, &first.resolution_ids).await;

        let outcome = harness.run(&node, &request("/"));
        let route = outcome.route.unwrap();
        assert_eq!(route.status, RouteStatus::Ready);
        match &route.kind {
            RouteKind::Redirect { to: Some(to) } => {
                assert_eq!(to.pathname, "/login");
                assert_eq!(to.query.get("from").map(String::as_str), Some("home"));
            }
            _ => panic!("expected settled redirect"),
        }
    }

    #[tokio::test]
    async fn test_busy_then_settled_reuses_route() {
        let harness = Harness::new();
        let node: Node = redirect_with(|request: RouteRequest| async move {
            Ok(format!("/login?from={}", request.mount_location().pathname))
        })
        .into();
        let mut events = harness.resolver.subscribe();

        let first = harness.run(&node, &request("/"));
        let busy = first.route.clone().unwrap();
        assert_eq!(busy.status, RouteStatus::Busy);
        assert!(matches!(busy.kind, RouteKind::Redirect { to: None }));

        settle_all(&mut events, &first.resolution_ids).await;

        let second = harness.run(&node, &request("/"));
        let settled = second.route.unwrap();
        assert!(!Arc::ptr_eq(&busy, &settled));
        match &settled.kind {
            RouteKind::Redirect { to: Some(to) } => {
                assert_eq!(to.query.get("from").map(String::as_str), Some("/"));
            }
            _ => panic!("expected settled redirect"),
        }

        // Unchanged resolution: the exact same route object again.
        let third = harness.run(&node, &request("/"));
        assert!(Arc::ptr_eq(&settled, &third.route.unwrap()));
    }

    #[tokio::test]
    async fn test_failed_target_becomes_error_route() {
        let harness = Harness::new();
        let node: Node = redirect_with(|_request| async {
            Err::<Location, _>(RouteError::resolve("no session"))
        })
        .into();
        let mut events = harness.resolver.subscribe();

        let first = harness.run(&node, &request("/"));
        settle_all(&mut events, &first.resolution_ids).await;

        let outcome = harness.run(&node, &request("/"));
        let route = outcome.route.unwrap();
        assert_eq!(route.status, RouteStatus::Error);
        assert_eq!(route.error, Some(RouteError::resolve("no session")));
        assert!(matches!(route.kind, RouteKind::Redirect { to: None }));
    }

    #[tokio::test]
    async fn test_redirect_chunk_keeps_literal_url() {
        let harness = Harness::new();
        let node: Node = redirect("/new").into();
        let mut events = harness.resolver.subscribe();

        let first = harness.run(&node, &request("/"));
        settle_all(&mut events, &first.resolution_ids).await;

        let route = harness.run(&node, &request("/")).route.unwrap();
        let chunk = &route.chunks[0];
        assert!(matches!(chunk.kind, ChunkKind::Redirect { .. }));
        assert_eq!(chunk.url.pathname(), "/");
    }
}
