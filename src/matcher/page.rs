//! Leaf node presenting content: title, view, data, head, headers, status.
//!
//! Every configured slot is resolved independently through the resolver,
//! so a settled title shows up while the data is still loading. The built
//! route is cached against the resolution pointers of all slots and only
//! rebuilt when one of them settles to a new object.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use smallvec::SmallVec;

use crate::chunk::{Chunk, ChunkKind, Headers, create_chunk};
use crate::core::url::Url;
use crate::core::RouteRequest;
use crate::error::RouteError;
use crate::matcher::{Dep, Deps, MatchContext, MatchOutcome};
use crate::resolver::{
    NodeKey, Resolution, ResolutionKey, Resolvable, Resolved, Slot, constant, resolvable,
};
use crate::route::{Route, RouteKind};

const TITLE: Slot = Slot(0);
const VIEW: Slot = Slot(1);
const DATA: Slot = Slot(2);
const HEAD: Slot = Slot(3);
const HEADERS: Slot = Slot(4);
const STATUS: Slot = Slot(5);

/// Start building a page node.
pub fn page() -> Page {
    Page::new()
}

/// A content leaf. Matches only when the remaining path is exhausted.
#[derive(Clone, Default)]
pub struct Page {
    title: Option<Resolvable>,
    view: Option<Resolvable>,
    data: Option<Resolvable>,
    head: Option<Resolvable>,
    headers: Option<Resolvable>,
    status: Option<Resolvable>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed page title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(constant(Resolved::Title(title.into())));
        self
    }

    /// Title computed from the request.
    pub fn title_with<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, RouteError>> + Send + 'static,
    {
        self.title = Some(resolvable(move |request| {
            let fut = f(request);
            async move { fut.await.map(Resolved::Title) }
        }));
        self
    }

    /// Fixed view payload (a template name, component id, rendered body...).
    pub fn view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(constant(Resolved::View(view.into())));
        self
    }

    /// View computed from the request.
    pub fn view_with<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, RouteError>> + Send + 'static,
    {
        self.view = Some(resolvable(move |request| {
            let fut = f(request);
            async move { fut.await.map(Resolved::View) }
        }));
        self
    }

    /// Fixed structured data.
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(constant(Resolved::Data(data)));
        self
    }

    /// Data loaded from the request, typically the slot that actually
    /// goes async.
    pub fn data_with<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RouteError>> + Send + 'static,
    {
        self.data = Some(resolvable(move |request| {
            let fut = f(request);
            async move { fut.await.map(Resolved::Data) }
        }));
        self
    }

    /// Extra document head markup.
    pub fn head(mut self, head: impl Into<String>) -> Self {
        self.head = Some(constant(Resolved::Head(head.into())));
        self
    }

    /// Response headers for static serving.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = Some(constant(Resolved::Headers(headers)));
        self
    }

    /// HTTP-ish status this page reports, e.g. 404 for a styled
    /// not-found page.
    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(constant(Resolved::Status(status)));
        self
    }

    fn slots(&self) -> impl Iterator<Item = (Slot, &Resolvable)> + '_ {
        [
            (TITLE, &self.title),
            (VIEW, &self.view),
            (DATA, &self.data),
            (HEAD, &self.head),
            (HEADERS, &self.headers),
            (STATUS, &self.status),
        ]
        .into_iter()
        .filter_map(|(slot, slot_resolvable)| slot_resolvable.as_ref().map(|r| (slot, r)))
    }

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

        let mut deps = Deps::new();
        let mut ids = SmallVec::new();
        let mut resolutions: SmallVec<[Arc<Resolution>; 6]> = SmallVec::new();
        for (slot, slot_resolvable) in self.slots() {
            let resolution =
                cx.resolver
                    .resolve(ResolutionKey::new(key, slot), slot_resolvable, request);
            ids.push(resolution.id);
            deps.push(Dep::Resolution(Arc::clone(&resolution)));
            resolutions.push(resolution);
        }

        let route = cx.build_or_cached(key, deps, || {
            let literal = Url::new(
                &request.mount_path,
                request.query.clone(),
                request.hash.clone(),
                false,
            );
            let mut chunks = Vec::with_capacity(resolutions.len() + 1);
            chunks.push(Chunk {
                url: literal,
                kind: ChunkKind::Url,
            });
            for resolution in &resolutions {
                chunks.push(resolution_chunk(request, resolution));
            }
            Route::assemble(RouteKind::page(), request.mount_url(), chunks, vec![])
        });

        MatchOutcome {
            route: Some(route),
            resolution_ids: ids,
        }
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let configured: Vec<&str> = [
            ("title", self.title.is_some()),
            ("view", self.view.is_some()),
            ("data", self.data.is_some()),
            ("head", self.head.is_some()),
            ("headers", self.headers.is_some()),
            ("status", self.status.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect();
        write!(f, "Page({})", configured.join(", "))
    }
}

/// Chunk for one slot's current resolution.
fn resolution_chunk(request: &RouteRequest, resolution: &Resolution) -> Chunk {
    if let Some(value) = &resolution.value {
        return create_chunk(request, resolved_chunk_kind(value.clone()), true);
    }
    if let Some(error) = &resolution.error {
        return create_chunk(
            request,
            ChunkKind::Error {
                error: error.clone(),
            },
            true,
        );
    }
    create_chunk(
        request,
        ChunkKind::Busy {
            resolution: resolution.id,
        },
        true,
    )
}

pub(crate) fn resolved_chunk_kind(value: Resolved) -> ChunkKind {
    match value {
        Resolved::Title(title) => ChunkKind::Title { title },
        Resolved::View(view) => ChunkKind::View { view },
        Resolved::Data(data) => ChunkKind::Data { data },
        Resolved::Head(head) => ChunkKind::Head { head },
        Resolved::Headers(headers) => ChunkKind::Headers { headers },
        Resolved::Status(status) => ChunkKind::Status { status },
        Resolved::Redirect(to) => ChunkKind::Redirect { to },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::sync::Notify;

    use crate::matcher::Node;
    use crate::matcher::testing::{Harness, request, settle_all};
    use crate::route::RouteStatus;

    #[test]
    fn test_leftover_path_does_not_match() {
        let harness = Harness::new();
        let node: Node = page().title("Home").into();
        let outcome = harness.run(&node, &request("/extra"));
        assert!(outcome.route.is_none());
        assert!(outcome.resolution_ids.is_empty());
    }

    #[tokio::test]
    async fn test_slots_settle_into_page_payload() {
        let harness = Harness::new();
        let node: Node = page()
            .title("About")
            .view("about.html")
            .data(json!({"team": 3}))
            .status(200)
            .into();
        let mut events = harness.resolver.subscribe();

        let first = harness.run(&node, &request("/"));
        let busy = first.route.unwrap();
        assert_eq!(busy.status, RouteStatus::Busy);
        assert_eq!(first.resolution_ids.len(), 4);

        settle_all(&mut events, &first.resolution_ids).await;

        let second = harness.run(&node, &request("/"));
        let route = second.route.unwrap();
        assert_eq!(route.status, RouteStatus::Ready);
        match &route.kind {
            RouteKind::Page {
                title,
                view,
                data,
                status_code,
                ..
            } => {
                assert_eq!(title.as_deref(), Some("About"));
                assert_eq!(view.as_deref(), Some("about.html"));
                assert_eq!(data, &json!({"team": 3}));
                assert_eq!(*status_code, Some(200));
            }
            _ => panic!("expected page kind"),
        }

        // Unchanged resolutions mean the same route object.
        let third = harness.run(&node, &request("/"));
        assert!(Arc::ptr_eq(&route, &third.route.unwrap()));
    }

    #[tokio::test]
    async fn test_partial_results_while_one_slot_pends() {
        let harness = Harness::new();
        let gate = Arc::new(Notify::new());
        let release = Arc::clone(&gate);
        let node: Node = page()
            .title("Posts")
            .data_with(move |_request| {
                let gate = Arc::clone(&release);
                async move {
                    gate.notified().await;
                    Ok(json!([1, 2, 3]))
                }
            })
            .into();
        let mut events = harness.resolver.subscribe();

        let first = harness.run(&node, &request("/"));
        let title_id = first.resolution_ids[0];
        settle_all(&mut events, &[title_id]).await;

        let partial = harness.run(&node, &request("/"));
        let route = partial.route.unwrap();
        assert_eq!(route.status, RouteStatus::Busy);
        match &route.kind {
            RouteKind::Page { title, data, .. } => {
                assert_eq!(title.as_deref(), Some("Posts"));
                assert_eq!(data, &Value::Null);
            }
            _ => panic!("expected page kind"),
        }
        let still_pending = route.pending_resolution_ids();
        assert_eq!(still_pending.len(), 1);

        gate.notify_one();
        settle_all(&mut events, &still_pending).await;

        let done = harness.run(&node, &request("/"));
        let route = done.route.unwrap();
        assert_eq!(route.status, RouteStatus::Ready);
        match &route.kind {
            RouteKind::Page { data, .. } => assert_eq!(data, &json!([1, 2, 3])),
            _ => panic!("expected page kind"),
        }
    }

    #[tokio::test]
    async fn test_failed_slot_becomes_error_route() {
        let harness = Harness::new();
        let node: Node = page()
            .title("Broken")
            .data_with(|_request| async { Err(RouteError::resolve("database offline")) })
            .into();
        let mut events = harness.resolver.subscribe();

        let first = harness.run(&node, &request("/"));
        settle_all(&mut events, &first.resolution_ids).await;

        let outcome = harness.run(&node, &request("/"));
        let route = outcome.route.unwrap();
        assert_eq!(route.status, RouteStatus::Error);
        assert_eq!(route.error, Some(RouteError::resolve("database offline")));
        // The settled title still made it into the payload.
        match &route.kind {
            RouteKind::Page { title, .. } => assert_eq!(title.as_deref(), Some("Broken")),
            _ => panic!("expected page kind"),
        }
    }

    #[tokio::test]
    async fn test_query_change_recomputes_slots() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let harness = Harness::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&counter);
        let node: Node = page()
            .data_with(move |request| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(json!(request.query.get("page"))) }
            })
            .into();
        let mut events = harness.resolver.subscribe();

        let first = harness.run(&node, &request("/?page=1"));
        settle_all(&mut events, &first.resolution_ids).await;
        let ready_one = harness.run(&node, &request("/?page=1")).route.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let second = harness.run(&node, &request("/?page=2"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        settle_all(&mut events, &second.resolution_ids).await;
        let ready_two = harness.run(&node, &request("/?page=2")).route.unwrap();

        assert!(!Arc::ptr_eq(&ready_one, &ready_two));
        match &ready_two.kind {
            RouteKind::Page { data, .. } => assert_eq!(data, &json!("2")),
            _ => panic!("expected page kind"),
        }
    }

    #[tokio::test]
    async fn test_url_chunk_keeps_literal_form_and_hash() {
        let harness = Harness::new();
        let node: Node = page().title("Home").into();

        let outcome = harness.run(&node, &request("/?a=1#top"));
        let route = outcome.route.unwrap();
        let url_chunk = route
            .chunks
            .iter()
            .find(|c| matches!(c.kind, ChunkKind::Url))
            .unwrap();
        assert_eq!(url_chunk.url.hash(), Some("top"));
        assert_eq!(url_chunk.url.href(), "/?a=1#top");
        // The route's own url is normalized and hash-free.
        assert_eq!(route.url.href(), "/?a=1");
    }
}
