//! Core types - pure abstractions shared across the codebase.

mod request;
pub mod url;

pub use request::RouteRequest;
pub use url::{Location, Query, Url, join_paths, split_segments};
