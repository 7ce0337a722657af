//! Portolan - URL route resolution for async navigation and static rendering.
//!
//! A router is a tree of matcher nodes built from [`mount`], [`page`] and
//! [`redirect`]. Resolving a URL walks the tree, runs whatever async
//! resolvables the matched nodes declare, and assembles the results into a
//! [`Route`] made of typed [`Chunk`]s. Re-resolving reuses every part whose
//! inputs did not change, so consumers can diff consecutive routes by `Arc`
//! pointer instead of by value.
//!
//! On top of resolution sit a crawler ([`crawl`]) that follows every static
//! pattern reachable from the root into a [`SiteMap`], and a generator
//! ([`generate`]) that renders a crawled site to files.
//!
//! ```
//! use portolan::{Router, mount, page, redirect};
//!
//! # async fn demo() {
//! let router = Router::new(
//!     mount()
//!         .at("/", page().title("Home").view("home"))
//!         .at("/about", page().title("About").view("about"))
//!         .at("/old", redirect("/about")),
//! );
//!
//! let route = router.resolve_steady("/about").await;
//! assert_eq!(route.title(), Some("About"));
//! # }
//! ```

pub mod chunk;
pub mod core;
pub mod error;
pub mod generator;
pub mod logger;
pub mod matcher;
pub mod resolver;
pub mod route;
pub mod router;
pub mod sitemap;

pub use chunk::{Chunk, ChunkKind, Headers};
pub use crate::core::{Location, Query, RouteRequest, Url, join_paths, split_segments};
pub use error::RouteError;
pub use generator::{GenerateSummary, GeneratorConfig, MemoryFs, RealFs, SiteFs, generate};
pub use matcher::{
    Mount, Node, Page, Redirect, mount, page, pattern_is_static, redirect, redirect_with,
};
pub use resolver::{
    Resolution, ResolutionId, ResolutionStatus, Resolvable, Resolved, Resolver, constant,
    resolvable,
};
pub use route::{Route, RouteKind, RouteStatus};
pub use router::Router;
pub use sitemap::{SiteMap, crawl, crawl_from};
