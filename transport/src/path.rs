//! Hierarchical object paths
//!
//! Paths are `/`-separated, e.g. `/org/bluez/hci0/dev_AA_BB/service000a/char000b`.
//! Owning-entity lookups work by trimming trailing segments, so the helpers
//! here are the single place that knows how segments are counted.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a remote object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Wrap a path string
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The root object, `/`
    pub fn root() -> Self {
        Self("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-empty segments, root first
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Last segment, `None` for the root
    pub fn last_segment(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Path with the last `n` segments removed
    ///
    /// Returns `None` when the path does not have more than `n` segments,
    /// since nothing meaningful is left to name an owner.
    ///
    /// ```rust
    /// use ble_transport::ObjectPath;
    ///
    /// let char_path = ObjectPath::new("/org/bluez/hci0/dev_AA/service1/char2");
    /// assert_eq!(char_path.trim_segments(2).unwrap().as_str(), "/org/bluez/hci0/dev_AA");
    /// assert!(ObjectPath::new("/a").trim_segments(1).is_none());
    /// ```
    pub fn trim_segments(&self, n: usize) -> Option<ObjectPath> {
        let trimmed = self.0.trim_end_matches('/');
        let mut end = trimmed.len();
        for _ in 0..n {
            end = trimmed[..end].rfind('/')?;
        }
        if end == 0 {
            return None;
        }
        Some(ObjectPath(trimmed[..end].to_string()))
    }

    /// True if `self` sits strictly below `ancestor`
    ///
    /// `/a/bc` is not a descendant of `/a/b`; `/a/b` is not a descendant of
    /// itself.
    pub fn is_descendant_of(&self, ancestor: &ObjectPath) -> bool {
        let prefix = ancestor.0.trim_end_matches('/');
        self.0.len() > prefix.len()
            && self.0.starts_with(prefix)
            && self.0.as_bytes()[prefix.len()] == b'/'
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ObjectPath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ObjectPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ObjectPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}
