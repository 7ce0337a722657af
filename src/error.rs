//! Engine error types.
//!
//! `RouteError` values travel as data: a failed resolvable or an unmatched
//! path becomes an error chunk / error route, never a panic or an early
//! return out of the matching pass. The type is `Clone` because one error
//! is shared between a `Resolution` and every route built from it.

use thiserror::Error;

/// Errors surfaced on resolutions, chunks and routes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// No node matched the remaining path. Carries the full joined pathname
    /// (mount path + remaining path), not just the matched prefix.
    #[error("URL not found: {0}")]
    NotFound(String),

    /// A resolvable returned an error or its future failed.
    #[error("{0}")]
    Resolve(String),
}

impl RouteError {
    /// Shorthand for a resolvable failure message.
    pub fn resolve(message: impl Into<String>) -> Self {
        Self::Resolve(message.into())
    }

    /// True for the not-found variant.
    #[inline]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<anyhow::Error> for RouteError {
    fn from(err: anyhow::Error) -> Self {
        Self::Resolve(format!("{err:#}"))
    }
}
