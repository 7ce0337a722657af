//! Crawling a routing tree into a map of every reachable url.
//!
//! Starting from the root, each resolved route's mount chunks advertise
//! the patterns declared beneath it; static patterns are joined onto the
//! mount's url and queued, `:param` patterns cannot be enumerated and are
//! skipped. Urls classify into pages, redirects and errors, each map
//! ordered by url so output is deterministic.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::chunk::ChunkKind;
use crate::core::url::{Location, Query, Url, join_paths};
use crate::debug;
use crate::error::RouteError;
use crate::matcher::pattern_is_static;
use crate::route::{Route, RouteStatus};
use crate::router::Router;

/// Every url a routing tree can produce, classified.
#[derive(Debug, Default)]
pub struct SiteMap {
    /// Steady page routes by normalized url.
    pub pages: BTreeMap<String, Arc<Route>>,
    /// Redirect targets by normalized url.
    pub redirects: BTreeMap<String, Location>,
    /// Urls that resolved to an error, with the first error seen.
    pub errors: BTreeMap<String, RouteError>,
}

impl SiteMap {
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.redirects.is_empty() && self.errors.is_empty()
    }

    /// All crawled urls in order, whatever they classified as.
    pub fn all_urls(&self) -> impl Iterator<Item = &String> {
        self.pages
            .keys()
            .chain(self.redirects.keys())
            .chain(self.errors.keys())
    }
}

/// Crawl the whole tree starting at `/`.
pub async fn crawl(router: &Router) -> SiteMap {
    crawl_from(router, "/").await
}

/// Crawl starting from one url, breadth-first.
///
/// Only urls under the start url are followed, so crawling `/blog` stays
/// inside that subtree even though every route also reports its ancestor
/// mounts. Crawling `/` covers everything.
pub async fn crawl_from(router: &Router, root: &str) -> SiteMap {
    let mut map = SiteMap::default();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut queue: VecDeque<String> = VecDeque::new();

    let scope = Url::parse(root).href().to_string();
    seen.insert(scope.clone());
    queue.push_back(scope.clone());

    while let Some(href) = queue.pop_front() {
        let route = router.resolve_steady(Location::parse(&href)).await;

        for segment in route.segments() {
            for chunk in &segment.chunks {
                let ChunkKind::Mount { patterns } = &chunk.kind else {
                    continue;
                };
                for pattern in patterns {
                    if !pattern_is_static(pattern) {
                        debug!(
                            "crawl";
                            "skipping dynamic pattern {pattern} under {}",
                            chunk.url.pathname()
                        );
                        continue;
                    }
                    let joined = join_paths(chunk.url.pathname(), pattern);
                    let normalized = Url::new(&joined, Query::new(), None, true)
                        .href()
                        .to_string();
                    if !normalized.starts_with(&scope) {
                        continue;
                    }
                    if seen.insert(normalized.clone()) {
                        queue.push_back(normalized);
                    }
                }
            }
        }

        if let Some(to) = route.redirect_target() {
            map.redirects.insert(href, to.clone());
        } else if route.deep_status() == RouteStatus::Error {
            let error = route
                .first_error()
                .cloned()
                .unwrap_or_else(|| RouteError::NotFound(href.clone()));
            map.errors.insert(href, error);
        } else {
            map.pages.insert(href, route);
        }
    }

    map
}
