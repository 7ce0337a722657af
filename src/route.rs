//! Assembled routes: what a matching pass hands back to consumers.
//!
//! A [`Route`] is one matched segment folded from its chunks, linked to the
//! next segment through `remaining`. Routes are immutable and shared as
//! `Arc<Route>`; an unchanged segment keeps the same `Arc` across passes,
//! so pointer equality doubles as a "nothing changed" signal.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::chunk::{Chunk, ChunkKind, Headers};
use crate::core::url::{Location, Url};
use crate::error::RouteError;
use crate::resolver::ResolutionId;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStatus {
    /// Every resolvable for this segment settled successfully.
    Ready,
    /// At least one resolvable is still pending.
    Busy,
    /// A resolvable failed or nothing matched.
    Error,
}

/// What kind of node produced a route segment, plus its typed payload.
#[derive(Debug)]
pub enum RouteKind {
    Page {
        title: Option<String>,
        view: Option<String>,
        data: Value,
        head: Option<String>,
        headers: Headers,
        /// HTTP-ish status a page declared for itself, distinct from
        /// [`RouteStatus`].
        status_code: Option<u16>,
    },
    Redirect {
        /// `None` while the target is still resolving.
        to: Option<Location>,
    },
    Mount {
        patterns: Vec<String>,
    },
}

impl RouteKind {
    pub(crate) fn page() -> Self {
        Self::Page {
            title: None,
            view: None,
            data: Value::Null,
            head: None,
            headers: Headers::default(),
            status_code: None,
        }
    }
}

/// One matched segment of a location.
#[derive(Debug)]
pub struct Route {
    pub url: Url,
    pub status: RouteStatus,
    pub error: Option<RouteError>,
    pub kind: RouteKind,
    /// The chunks this segment was folded from, in emission order.
    pub chunks: Vec<Chunk>,
    /// Deeper matches under this segment. At most one for tree matching,
    /// kept as a list so consumers can walk it uniformly.
    pub remaining: Vec<Arc<Route>>,
}

impl Route {
    /// Fold a chunk list into a route segment.
    ///
    /// `seed` names the kind of node that emitted the chunks; the fold fills
    /// its payload in. Status starts ready and is demoted by busy chunks,
    /// error chunks win over everything and keep the first error seen.
    pub fn assemble(
        seed: RouteKind,
        url: Url,
        chunks: Vec<Chunk>,
        remaining: Vec<Arc<Route>>,
    ) -> Arc<Route> {
        let mut kind = seed;
        let mut status = RouteStatus::Ready;
        let mut error = None;

        for chunk in &chunks {
            match &chunk.kind {
                ChunkKind::Busy { .. } => {
                    if status == RouteStatus::Ready {
                        status = RouteStatus::Busy;
                    }
                }
                ChunkKind::Error { error: err } => {
                    status = RouteStatus::Error;
                    if error.is_none() {
                        error = Some(err.clone());
                    }
                }
                ChunkKind::Redirect { to } => {
                    if let RouteKind::Redirect { to: target } = &mut kind {
                        *target = Some(to.clone());
                    }
                }
                ChunkKind::Mount { patterns } => {
                    if let RouteKind::Mount { patterns: target } = &mut kind {
                        *target = patterns.clone();
                    }
                }
                ChunkKind::Title { title } => {
                    if let RouteKind::Page { title: target, .. } = &mut kind {
                        *target = Some(title.clone());
                    }
                }
                ChunkKind::View { view } => {
                    if let RouteKind::Page { view: target, .. } = &mut kind {
                        *target = Some(view.clone());
                    }
                }
                ChunkKind::Data { data } => {
                    if let RouteKind::Page { data: target, .. } = &mut kind {
                        *target = data.clone();
                    }
                }
                ChunkKind::Head { head } => {
                    if let RouteKind::Page { head: target, .. } = &mut kind {
                        *target = Some(head.clone());
                    }
                }
                ChunkKind::Headers { headers } => {
                    if let RouteKind::Page {
                        headers: target, ..
                    } = &mut kind
                    {
                        target.extend(headers.clone());
                    }
                }
                ChunkKind::Status { status: code } => {
                    if let RouteKind::Page { status_code, .. } = &mut kind {
                        *status_code = Some(*code);
                    }
                }
                ChunkKind::Url => {}
            }
        }

        Arc::new(Route {
            url,
            status,
            error,
            kind,
            chunks,
            remaining,
        })
    }

    /// Walk this segment and everything below it, outermost first.
    pub fn segments(&self) -> impl Iterator<Item = &Route> {
        let mut next = Some(self);
        std::iter::from_fn(move || {
            let current = next?;
            next = current.remaining.first().map(|r| &**r);
            Some(current)
        })
    }

    /// The deepest matched segment.
    pub fn leaf(&self) -> &Route {
        let mut current = self;
        while let Some(next) = current.remaining.first() {
            current = next;
        }
        current
    }

    /// Worst status along the whole chain: error beats busy beats ready.
    pub fn deep_status(&self) -> RouteStatus {
        let mut worst = RouteStatus::Ready;
        for segment in self.segments() {
            match segment.status {
                RouteStatus::Error => return RouteStatus::Error,
                RouteStatus::Busy => worst = RouteStatus::Busy,
                RouteStatus::Ready => {}
            }
        }
        worst
    }

    /// True when no segment in the chain is still busy.
    pub fn is_steady(&self) -> bool {
        self.segments().all(|s| s.status != RouteStatus::Busy)
    }

    /// First redirect target along the chain, if any segment redirects.
    pub fn redirect_target(&self) -> Option<&Location> {
        self.segments().find_map(|segment| match &segment.kind {
            RouteKind::Redirect { to } => to.as_ref(),
            _ => None,
        })
    }

    /// First error along the chain.
    pub fn first_error(&self) -> Option<&RouteError> {
        self.segments().find_map(|s| s.error.as_ref())
    }

    /// Deepest title along the chain; inner pages override outer ones.
    pub fn title(&self) -> Option<&str> {
        let mut found = None;
        for segment in self.segments() {
            if let RouteKind::Page {
                title: Some(title), ..
            } = &segment.kind
            {
                found = Some(title.as_str());
            }
        }
        found
    }

    /// Ids of every pending resolution along the chain, in chunk order.
    /// Settlement events carry exactly these ids.
    pub fn pending_resolution_ids(&self) -> SmallVec<[ResolutionId; 4]> {
        let mut ids = SmallVec::new();
        for segment in self.segments() {
            for chunk in &segment.chunks {
                if let ChunkKind::Busy { resolution } = chunk.kind {
                    ids.push(resolution);
                }
            }
        }
        ids
    }
}
