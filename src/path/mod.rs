//! Path Codec
//!
//! Flattens an absolute namespace path into a fixed-width document form: a `depth`
//! counter plus one positionally named field per segment (`"0"`, `"1"`, ...). The
//! document store has no notion of hierarchy, so every "self and descendants" or
//! "ancestor chain" query is expressed as equality predicates over these fields
//! (see [`filter`]).

pub mod filter;

use crate::error::{MirrorError, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Maximum number of segments a path may carry.
pub const MAX_DEPTH: usize = 32;

/// Document field holding the path depth.
pub const FIELD_DEPTH: &str = "depth";

/// Document field name for the segment at `index`.
pub fn field_name(index: usize) -> String {
    index.to_string()
}

/// Index key for a sequence of segments; see [`InodePath::index_key`].
pub fn index_key<'a>(segments: impl IntoIterator<Item = &'a str>) -> Vec<u8> {
    let mut key = vec![b'/'];
    for segment in segments {
        key.extend_from_slice(segment.as_bytes());
        key.push(0);
    }
    key
}

/// Absolute path in the mirrored namespace.
///
/// Segments are filled left to right; `segments.len()` is the depth and never
/// exceeds [`MAX_DEPTH`]. The root is the empty sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InodePath {
    segments: Vec<String>,
}

impl InodePath {
    /// The root path (depth 0).
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parse an absolute, `/`-separated path.
    ///
    /// Repeated and trailing separators are ignored. `.` and `..` segments are
    /// rejected rather than resolved.
    pub fn parse(raw: &str) -> Result<Self> {
        if !raw.starts_with('/') {
            return Err(invalid(raw, "absolute path required"));
        }
        let segments: Vec<String> = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self::from_segments(segments).map_err(|e| match e {
            MirrorError::InvalidPath { reason, .. } => invalid(raw, &reason),
            other => other,
        })
    }

    /// Build a path from already split segments.
    pub fn from_segments(segments: Vec<String>) -> Result<Self> {
        if segments.len() > MAX_DEPTH {
            return Err(invalid(
                &segments.join("/"),
                &format!("depth {} exceeds maximum {}", segments.len(), MAX_DEPTH),
            ));
        }
        for segment in &segments {
            if segment.is_empty() || segment == "." || segment == ".."
                || segment.contains('/')
                || segment.contains('\0')
            {
                return Err(invalid(
                    &segments.join("/"),
                    &format!("illegal segment {:?}", segment),
                ));
            }
        }
        Ok(Self { segments })
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    /// Last segment, or the empty string for the root.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Immediate parent, `None` for the root.
    pub fn parent(&self) -> Option<InodePath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Strict ancestors ordered from the root (depth 0) down to depth `depth - 1`.
    pub fn ancestors(&self) -> Vec<InodePath> {
        (0..self.depth())
            .map(|d| Self {
                segments: self.segments[..d].to_vec(),
            })
            .collect()
    }

    /// Path of a direct child named `name`.
    pub fn child(&self, name: &str) -> Result<InodePath> {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self::from_segments(segments)
    }

    /// Whether `prefix`'s segments are a literal prefix of this path.
    /// Every path has the root as prefix, and every path is a prefix of itself.
    pub fn has_prefix(&self, prefix: &InodePath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Ordered byte key for the path index.
    ///
    /// Every segment is terminated by `0x00`, so a path's key is a byte prefix of
    /// exactly its own key and the keys of its descendants.
    pub fn index_key(&self) -> Vec<u8> {
        index_key(self.segments.iter().map(String::as_str))
    }

    /// Replace `old_prefix` with `new_prefix`, keeping the remaining suffix.
    pub fn rewrite_prefix(&self, old_prefix: &InodePath, new_prefix: &InodePath) -> Result<InodePath> {
        if !self.has_prefix(old_prefix) {
            return Err(MirrorError::PrefixMismatch {
                path: self.to_string(),
                prefix: old_prefix.to_string(),
            });
        }
        let mut segments = new_prefix.segments.clone();
        segments.extend_from_slice(&self.segments[old_prefix.depth()..]);
        Self::from_segments(segments)
    }

    /// Encode into the flat document form `{depth, "0", "1", ...}`.
    pub fn encode(&self) -> Value {
        let mut map = Map::with_capacity(self.depth() + 1);
        map.insert(FIELD_DEPTH.to_string(), Value::from(self.depth() as u64));
        for (i, segment) in self.segments.iter().enumerate() {
            map.insert(field_name(i), Value::String(segment.clone()));
        }
        Value::Object(map)
    }

    /// Decode the flat document form, checking the field layout invariant:
    /// fields `[0, depth)` are non-null strings and fields `>= depth` are absent or null.
    pub fn decode(doc: &Value) -> Result<InodePath> {
        let map = doc
            .as_object()
            .ok_or_else(|| invalid(&doc.to_string(), "encoded path must be an object"))?;
        let depth = map
            .get(FIELD_DEPTH)
            .and_then(Value::as_u64)
            .ok_or_else(|| invalid(&doc.to_string(), "missing or non-integer depth"))?
            as usize;
        if depth > MAX_DEPTH {
            return Err(invalid(
                &doc.to_string(),
                &format!("depth {} exceeds maximum {}", depth, MAX_DEPTH),
            ));
        }

        let mut segments = Vec::with_capacity(depth);
        for i in 0..depth {
            match map.get(&field_name(i)) {
                Some(Value::String(s)) => segments.push(s.clone()),
                _ => {
                    return Err(invalid(
                        &doc.to_string(),
                        &format!("segment {} missing below depth {}", i, depth),
                    ))
                }
            }
        }
        for (key, value) in map {
            if key == FIELD_DEPTH || value.is_null() {
                continue;
            }
            match key.parse::<usize>() {
                Ok(index) if index < depth => {}
                _ => {
                    return Err(invalid(
                        &doc.to_string(),
                        &format!("unexpected field {:?} for depth {}", key, depth),
                    ))
                }
            }
        }
        Self::from_segments(segments)
    }
}

fn invalid(path: &str, reason: &str) -> MirrorError {
    MirrorError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

impl fmt::Display for InodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for InodePath {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for InodePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.encode().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InodePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        InodePath::decode(&value).map_err(D::Error::custom)
    }
}
