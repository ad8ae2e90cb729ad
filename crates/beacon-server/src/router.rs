//! URL prefix dispatch.
//!
//! The gateway routes in two steps:
//!
//! 1. **Prefix resolution**: the request path is matched segment by segment
//!    against the mounted prefixes (`/api/users`, ...). The first mount whose
//!    segments are all a leading part of the path wins.
//! 2. **Resource path**: whatever follows the prefix is classified as the
//!    collection (`/`), one item (`/{id}`), or unknown.
//!
//! No other component matches on paths.
//!
//! # Example
//!
//! ```rust
//! use beacon_server::router::{ResourcePath, Router};
//!
//! let mut router = Router::new();
//! router.mount("/api/users", "users");
//! router.mount("/api/messages", "messages");
//!
//! let matched = router.resolve("/api/users/42").unwrap();
//! assert_eq!(*matched.target(), "users");
//! assert_eq!(matched.resource_path(), ResourcePath::Item("42"));
//!
//! // Segment-wise: `/api/usersX` is not under `/api/users`
//! assert!(router.resolve("/api/usersX").is_none());
//! ```

/// A resolved mount and the path left after its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteMatch<'r, 'p, T> {
    prefix: &'r str,
    target: &'r T,
    rest: &'p str,
}

impl<'r, 'p, T> RouteMatch<'r, 'p, T> {
    /// The matched prefix, as mounted.
    #[must_use]
    pub fn prefix(&self) -> &'r str {
        self.prefix
    }

    /// The mounted target.
    #[must_use]
    pub fn target(&self) -> &'r T {
        self.target
    }

    /// The remainder of the path, starting with `/` or empty.
    #[must_use]
    pub fn rest(&self) -> &'p str {
        self.rest
    }

    /// Classifies the remainder.
    #[must_use]
    pub fn resource_path(&self) -> ResourcePath<'p> {
        ResourcePath::parse(self.rest)
    }
}

/// Position within a resource's route group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePath<'p> {
    /// The collection itself.
    Collection,
    /// A single item; the raw id segment.
    Item(&'p str),
    /// Anything deeper.
    Unknown,
}

impl<'p> ResourcePath<'p> {
    /// Classifies a path remainder. Empty segments are ignored, so a
    /// trailing slash addresses the same route.
    #[must_use]
    pub fn parse(rest: &'p str) -> Self {
        let mut segments = rest.split('/').filter(|s| !s.is_empty());
        match (segments.next(), segments.next()) {
            (None, _) => Self::Collection,
            (Some(id), None) => Self::Item(id),
            (Some(_), Some(_)) => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone)]
struct Mount<T> {
    prefix: String,
    segments: Vec<String>,
    target: T,
}

impl<T> Mount<T> {
    /// Returns the remainder of `path` if it lies under this mount.
    fn strip<'p>(&self, path: &'p str) -> Option<&'p str> {
        let mut rest = path;
        for expected in &self.segments {
            let trimmed = rest.trim_start_matches('/');
            let end = trimmed.find('/').unwrap_or(trimmed.len());
            if &trimmed[..end] != expected {
                return None;
            }
            rest = &trimmed[end..];
        }
        Some(rest)
    }
}

/// Prefix router over mounted targets.
#[derive(Debug, Clone)]
pub struct Router<T> {
    mounts: Vec<Mount<T>>,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Self { mounts: Vec::new() }
    }
}

impl<T> Router<T> {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts `target` under `prefix`.
    pub fn mount(&mut self, prefix: impl Into<String>, target: T) {
        let prefix = prefix.into();
        let segments = prefix
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self.mounts.push(Mount {
            prefix,
            segments,
            target,
        });
    }

    /// Number of mounts.
    #[must_use]
    pub fn mount_count(&self) -> usize {
        self.mounts.len()
    }

    /// The mounted prefixes in registration order.
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.mounts.iter().map(|m| m.prefix.as_str())
    }

    /// Finds the mount a path belongs to.
    #[must_use]
    pub fn resolve<'r, 'p>(&'r self, path: &'p str) -> Option<RouteMatch<'r, 'p, T>> {
        // Mounts are checked in order; first match wins
        self.mounts.iter().find_map(|mount| {
            mount.strip(path).map(|rest| RouteMatch {
                prefix: &mount.prefix,
                target: &mount.target,
                rest,
            })
        })
    }
}
