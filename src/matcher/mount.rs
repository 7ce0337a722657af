//! Branch node: consumes path segments and delegates the rest.
//!
//! A mount holds ordered `(pattern, node)` entries. Patterns are segment
//! lists; `:name` segments capture into the request params. Matching tries
//! entries most-specific first (more segments, then fewer params, then
//! declaration order) and falls through on a child that declines, so a
//! leaf with leftover path simply lets the next pattern have a go. When
//! nothing takes the remainder the mount produces a not-found route
//! itself rather than declining.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::{SmallVec, smallvec};

use crate::chunk::{ChunkKind, create_chunk, create_not_found_chunk};
use crate::core::url::split_segments;
use crate::core::RouteRequest;
use crate::matcher::{Dep, Deps, MatchContext, MatchOutcome, Node};
use crate::resolver::{NodeKey, ResolutionId};
use crate::route::{Route, RouteKind};

/// Start building a mount node.
pub fn mount() -> Mount {
    Mount::new()
}

/// A branch over path patterns.
#[derive(Clone, Default)]
pub struct Mount {
    entries: Vec<MountEntry>,
}

#[derive(Clone)]
struct MountEntry {
    pattern: Pattern,
    node: Node,
}

impl Mount {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern. Entries re-sort by specificity on every add; ties
    /// keep declaration order.
    pub fn at(mut self, pattern: &str, node: impl Into<Node>) -> Self {
        self.entries.push(MountEntry {
            pattern: Pattern::parse(pattern),
            node: node.into(),
        });
        self.entries.sort_by(|a, b| {
            b.pattern
                .segments
                .len()
                .cmp(&a.pattern.segments.len())
                .then(a.pattern.param_count().cmp(&b.pattern.param_count()))
        });
        self
    }

    /// Declared patterns in match order.
    pub fn patterns(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.pattern.raw.clone())
            .collect()
    }

    pub(crate) fn execute(
        &self,
        key: NodeKey,
        request: &RouteRequest,
        cx: &mut MatchContext<'_>,
    ) -> MatchOutcome {
        cx.engage(key, request);

        let segments = split_segments(&request.path);
        let mut ids: SmallVec<[ResolutionId; 4]> = SmallVec::new();

        for (index, entry) in self.entries.iter().enumerate() {
            let Some(captured) = entry.pattern.match_prefix(&segments) else {
                continue;
            };
            let consumed = entry.pattern.segments.len();
            let child_key = cx.arena.child(key, index as u32);
            let child_request =
                request.descend(&segments[..consumed], &segments[consumed..], captured);
            let outcome = entry.node.execute(child_key, &child_request, cx);
            ids.extend(outcome.resolution_ids.iter().copied());

            let Some(child_route) = outcome.route else {
                // Child declined the remainder, next pattern may still take it.
                continue;
            };

            let deps: Deps = smallvec![Dep::Child(Arc::clone(&child_route))];
            let route = cx.build_or_cached(key, deps, || {
                let chunk = create_chunk(
                    request,
                    ChunkKind::Mount {
                        patterns: self.patterns(),
                    },
                    true,
                );
                Route::assemble(
                    RouteKind::Mount {
                        patterns: self.patterns(),
                    },
                    request.mount_url(),
                    vec![chunk],
                    vec![child_route],
                )
            });
            return MatchOutcome {
                route: Some(route),
                resolution_ids: ids,
            };
        }

        // Nothing took the remainder.
        let route = cx.build_or_cached(key, Deps::new(), || {
            let mount_chunk = create_chunk(
                request,
                ChunkKind::Mount {
                    patterns: self.patterns(),
                },
                true,
            );
            let not_found = create_not_found_chunk(request);
            Route::assemble(
                RouteKind::Mount {
                    patterns: self.patterns(),
                },
                request.mount_url(),
                vec![mount_chunk, not_found],
                vec![],
            )
        });
        MatchOutcome {
            route: Some(route),
            resolution_ids: ids,
        }
    }
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mount({})", self.patterns().join(", "))
    }
}

// ============================================================================
// Patterns
// ============================================================================

#[derive(Clone)]
struct Pattern {
    /// Normalized display form: `/`, `/blog`, `/users/:id`.
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Clone, PartialEq)]
enum Segment {
    Literal(String),
    Param(String),
}

impl Pattern {
    fn parse(raw: &str) -> Self {
        let segments: Vec<Segment> = split_segments(raw)
            .into_iter()
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();
        let raw = if segments.is_empty() {
            "/".to_string()
        } else {
            segments.iter().fold(String::new(), |mut acc, segment| {
                acc.push('/');
                match segment {
                    Segment::Literal(lit) => acc.push_str(lit),
                    Segment::Param(name) => {
                        acc.push(':');
                        acc.push_str(name);
                    }
                }
                acc
            })
        };
        Self { raw, segments }
    }

    /// Match against the head of the remaining segments, yielding captured
    /// params. The empty pattern (`/`) only matches an exhausted path.
    fn match_prefix(&self, remaining: &[&str]) -> Option<FxHashMap<String, String>> {
        if self.segments.is_empty() {
            return remaining.is_empty().then(FxHashMap::default);
        }
        if remaining.len() < self.segments.len() {
            return None;
        }
        let mut params = FxHashMap::default();
        for (segment, actual) in self.segments.iter().zip(remaining) {
            match segment {
                Segment::Literal(lit) => {
                    if lit != actual {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), (*actual).to_string());
                }
            }
        }
        Some(params)
    }

    fn param_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Param(_)))
            .count()
    }

    pub(crate) fn is_static_str(raw: &str) -> bool {
        !raw.split('/').any(|segment| segment.starts_with(':'))
    }
}

/// True when a declared pattern has no `:param` segments, so a crawler can
/// enumerate it.
pub fn pattern_is_static(pattern: &str) -> bool {
    Pattern::is_static_str(pattern)
}
