//! Route chunks: the small typed facts nodes emit while matching.
//!
//! Each matched node contributes chunks (title, view, redirect target,
//! mount patterns, ...) stamped with the url they belong to. Route
//! assembly folds a chunk list into one typed record per matched segment.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::core::url::{Location, Url, join_paths};
use crate::core::RouteRequest;
use crate::error::RouteError;
use crate::resolver::ResolutionId;

/// Response headers contributed by a page.
pub type Headers = FxHashMap<String, String>;

/// One typed fact about a matched url.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub url: Url,
    pub kind: ChunkKind,
}

#[derive(Debug, Clone)]
pub enum ChunkKind {
    /// A resolvable for this url has not settled yet. Carries the pending
    /// resolution's id so consumers can wait for exactly that settlement.
    Busy { resolution: ResolutionId },
    Data { data: Value },
    Error { error: RouteError },
    Head { head: String },
    Headers { headers: Headers },
    /// The patterns a mount declared, in match order.
    Mount { patterns: Vec<String> },
    Redirect { to: Location },
    Status { status: u16 },
    Title { title: String },
    /// Marks the full matched url, hash included.
    Url,
    View { view: String },
}

impl ChunkKind {
    /// Stable lowercase tag, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Busy { .. } => "busy",
            Self::Data { .. } => "data",
            Self::Error { .. } => "error",
            Self::Head { .. } => "head",
            Self::Headers { .. } => "headers",
            Self::Mount { .. } => "mount",
            Self::Redirect { .. } => "redirect",
            Self::Status { .. } => "status",
            Self::Title { .. } => "title",
            Self::Url => "url",
            Self::View { .. } => "view",
        }
    }
}

/// Build a chunk for the url a node matched at.
///
/// The url is derived from the request's mount path and query. Most chunks
/// want the normalized (trailing slash) form; redirect and url chunks pass
/// `ensure_trailing_slash = false` to keep the path exactly as matched.
pub fn create_chunk(request: &RouteRequest, kind: ChunkKind, ensure_trailing_slash: bool) -> Chunk {
    Chunk {
        url: Url::new(
            &request.mount_path,
            request.query.clone(),
            None,
            ensure_trailing_slash,
        ),
        kind,
    }
}

/// Error chunk for a path nothing matched.
///
/// The url joins the mount path with the unmatched remainder and skips
/// trailing slash normalization: the reported url is exactly what failed
/// to match.
pub fn create_not_found_chunk(request: &RouteRequest) -> Chunk {
    let full = join_paths(&request.mount_path, &request.path);
    Chunk {
        url: Url::new(&full, request.query.clone(), None, false),
        kind: ChunkKind::Error {
            error: RouteError::NotFound(full),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rustc_hash::FxHashMap;
    use serde_json::Value;

    use crate::core::url::Location;

    fn request_at(mount_path: &str, path: &str) -> RouteRequest {
        let mut request = RouteRequest::root(&Location::parse("/"), Value::Null);
        request.mount_path = mount_path.to_string();
        request.path = path.to_string();
        request.params = FxHashMap::default();
        request
    }

    #[test]
    fn test_create_chunk_normalizes_url() {
        let request = request_at("/blog/post", "");
        let chunk = create_chunk(
            &request,
            ChunkKind::Title {
                title: "Post".to_string(),
            },
            true,
        );
        assert_eq!(chunk.url.pathname(), "/blog/post/");
        assert_eq!(chunk.kind.name(), "title");
    }

    #[test]
    fn test_create_chunk_literal_form() {
        let request = request_at("/blog/post", "");
        let chunk = create_chunk(
            &request,
            ChunkKind::Redirect {
                to: Location::parse("/login"),
            },
            false,
        );
        assert_eq!(chunk.url.pathname(), "/blog/post");
    }

    #[test]
    fn test_not_found_chunk_joins_full_pathname() {
        let request = request_at("/blog", "/missing");
        let chunk = create_not_found_chunk(&request);
        assert_eq!(chunk.url.pathname(), "/blog/missing");
        match chunk.kind {
            ChunkKind::Error { error } => {
                assert_eq!(error, RouteError::NotFound("/blog/missing".to_string()));
            }
            other => panic!("expected error chunk, got {}", other.name()),
        }
    }

    #[test]
    fn test_not_found_chunk_skips_slash_normalization() {
        let request = request_at("", "/nope");
        let chunk = create_not_found_chunk(&request);
        assert_eq!(chunk.url.pathname(), "/nope");
    }
}
