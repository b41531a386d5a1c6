//! Hierarchical store paths.

use std::fmt;

use hackhub_core::{DataError, DataResult};

/// Characters the realtime database refuses in a key.
const FORBIDDEN_KEY_CHARS: [char; 6] = ['.', '$', '#', '[', ']', '/'];

/// A validated absolute path such as `/updates/<hackathon>/<update>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreePath {
    segments: Vec<String>,
}

impl TreePath {
    /// The root path `/`.
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Path rooted at a feature, e.g. `/updates`.
    pub fn feature(feature: &str) -> DataResult<Self> {
        Self::root().child(feature)
    }

    /// `/<feature>/<tenant>/<entity>` with an optional entity segment.
    pub fn entity(feature: &str, tenant: &str, entity: Option<&str>) -> DataResult<Self> {
        let path = Self::feature(feature)?.child(tenant)?;
        match entity {
            Some(id) => path.child(id),
            None => Ok(path),
        }
    }

    /// Parse a `/`-separated string. Empty segments are ignored.
    pub fn parse(raw: &str) -> DataResult<Self> {
        raw.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(Self::root(), |path, segment| path.child(segment))
    }

    /// Append one key.
    pub fn child(mut self, key: &str) -> DataResult<Self> {
        if key.is_empty() {
            return Err(DataError::validation("Path segment must not be empty"));
        }
        if key.contains(FORBIDDEN_KEY_CHARS) {
            return Err(DataError::validation(format!(
                "Path segment '{}' contains a forbidden character",
                key
            )));
        }
        self.segments.push(key.to_string());
        Ok(self)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, or `None` at the root.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}
