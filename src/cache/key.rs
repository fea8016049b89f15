//! Query Key Module
//!
//! Structural identifiers for cached resources.

use std::fmt;

use serde::{Deserialize, Serialize};

// == Query Key ==
/// Identifies a fetchable resource, e.g. `["ranking", "daily", "2024-01-01"]`.
///
/// Keys compare structurally, segment by segment. On the wire a key is a JSON
/// array of strings; in URLs and logs it is rendered as `seg/seg/seg`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parses a `/`-separated path, ignoring empty segments.
    pub fn from_path(path: &str) -> Self {
        Self::new(path.split('/').filter(|segment| !segment.is_empty()))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}
