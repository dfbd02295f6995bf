// SPDX-License-Identifier: AGPL-3.0-or-later
//! Logical item identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical, backend-agnostic path naming an item.
///
/// Identifiers are normalized on construction: inner empty segments are
/// dropped, `.` is ignored and `..` climbs one level (never above the root).
/// A trailing `/` is kept as an empty last segment, so `/a/` has an empty
/// [`name`](Self::name) and is not the same identifier as `/a`. Such an
/// identifier can be queried but never created.
///
/// Segments are compared byte for byte. No case folding is applied, so
/// `/Docs` and `/docs` are different items even on backends that would
/// treat them as one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Identifier {
    segments: Vec<String>,
    /// Path ended in `/` after at least one named segment
    trailing_separator: bool,
}

impl Identifier {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self::root().join(path)
    }

    pub fn root() -> Self {
        Self { segments: Vec::new(), trailing_separator: false }
    }

    pub fn join(&self, name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        let mut segments = self.segments.clone();
        let mut trailing_separator = self.trailing_separator;
        for part in name.split('/').filter(|s| !s.is_empty()) {
            if part == ".." {
                segments.pop();
            } else if part != "." {
                segments.push(part.to_string());
            }
            trailing_separator = false;
        }
        if name.ends_with('/') {
            trailing_separator = true;
        }
        let trailing_separator = trailing_separator && !segments.is_empty();
        Self { segments, trailing_separator }
    }

    /// `/a/b` for `/a/b/c`, and `/a` for `/a/`.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            None
        } else if self.trailing_separator {
            Some(Self { segments: self.segments.clone(), trailing_separator: false })
        } else {
            let mut segments = self.segments.clone();
            segments.pop();
            Some(Self { segments, trailing_separator: false })
        }
    }

    /// Last segment, empty for the root and for paths ending in `/`.
    pub fn name(&self) -> &str {
        if self.trailing_separator {
            return "";
        }
        self.segments.last().map(|s| s.as_str()).unwrap_or("")
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether `self` equals `ancestor` or lies below it.
    pub fn starts_with(&self, ancestor: &Identifier) -> bool {
        self.segments.starts_with(&ancestor.segments)
    }

    /// Replace the `from` prefix with `to`, e.g. `/src/a/b` rebased from `/src`
    /// onto `/dst` gives `/dst/a/b`. Returns `None` when `self` is not below `from`.
    pub fn rebase(&self, from: &Identifier, to: &Identifier) -> Option<Self> {
        let rest = self.segments.strip_prefix(from.segments.as_slice())?;
        let mut segments = to.segments.clone();
        segments.extend(rest.iter().cloned());
        let trailing_separator = self.trailing_separator && !segments.is_empty();
        Some(Self { segments, trailing_separator })
    }

    pub fn to_path_string(&self) -> String {
        if self.segments.is_empty() {
            "/".to_string()
        } else if self.trailing_separator {
            format!("/{}/", self.segments.join("/"))
        } else {
            format!("/{}", self.segments.join("/"))
        }
    }
}

impl Default for Identifier {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path_string())
    }
}

impl From<String> for Identifier {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

impl From<&str> for Identifier {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<Identifier> for String {
    fn from(identifier: Identifier) -> Self {
        identifier.to_path_string()
    }
}
