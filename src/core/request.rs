//! The request handed to each node during a matching pass.
//!
//! As mounts consume path segments the request splits the original pathname
//! into `mount_path` (already matched) and `path` (still to match), carrying
//! the query, hash, captured params and the router environment along.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::core::url::{Location, Query, Url, join_paths};

/// What a node sees while matching: the consumed prefix, the remainder,
/// and everything the original location carried.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    /// Pathname prefix matched so far. Empty at the root, no trailing slash.
    pub mount_path: String,
    /// Remaining pathname to match. Empty or `/` once fully consumed.
    pub path: String,
    pub query: Query,
    pub hash: Option<String>,
    /// Params captured from `:name` pattern segments, parent captures included.
    pub params: FxHashMap<String, String>,
    /// Router-wide environment, identical for every node in a pass.
    pub context: Value,
}

impl RouteRequest {
    /// The request the root node receives for a location.
    pub fn root(location: &Location, context: Value) -> Self {
        let path = if location.pathname.starts_with('/') {
            location.pathname.clone()
        } else {
            format!("/{}", location.pathname)
        };
        Self {
            mount_path: String::new(),
            path,
            query: location.query.clone(),
            hash: location.hash.clone(),
            params: FxHashMap::default(),
            context,
        }
    }

    /// Derive the request a child node receives after its parent consumed
    /// `consumed` segments of the remaining path.
    pub(crate) fn descend(
        &self,
        consumed: &[&str],
        remaining: &[&str],
        captured: FxHashMap<String, String>,
    ) -> Self {
        let mut mount_path = self.mount_path.clone();
        for segment in consumed {
            mount_path.push('/');
            mount_path.push_str(segment);
        }
        let path = if remaining.is_empty() {
            String::new()
        } else {
            let mut path = String::new();
            for segment in remaining {
                path.push('/');
                path.push_str(segment);
            }
            path
        };
        let mut params = self.params.clone();
        params.extend(captured);
        Self {
            mount_path,
            path,
            query: self.query.clone(),
            hash: self.hash.clone(),
            params,
            context: self.context.clone(),
        }
    }

    /// True once the path is fully consumed, so leaf nodes may match.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.path.is_empty() || self.path == "/"
    }

    /// The full original pathname: matched prefix joined with the remainder.
    pub fn full_pathname(&self) -> String {
        join_paths(&self.mount_path, &self.path)
    }

    /// The location this node matched at (mount path + query, no hash).
    pub fn mount_location(&self) -> Location {
        Location {
            pathname: if self.mount_path.is_empty() {
                "/".to_string()
            } else {
                self.mount_path.clone()
            },
            query: self.query.clone(),
            hash: None,
            state: None,
        }
    }

    /// Normalized url of the mount point, for stamping onto routes.
    pub(crate) fn mount_url(&self) -> Url {
        Url::new(&self.mount_path, self.query.clone(), None, true)
    }
}
