//! # intent-forms-path
//!
//! Field-name addressing for nested form data.
//!
//! A form field name such as `addresses[0].city` or `tags[]` is parsed into a
//! [`Path`]: an immutable sequence of [`Segment`]s. The same path addresses a
//! value inside a nested value tree and a node inside a schema tree, and is
//! used to match validation issues back to the field that produced them.
//!
//! ## Example
//!
//! ```
//! use intent_forms_path::{Path, Segment};
//!
//! let path: Path = "addresses[0].city".parse().unwrap();
//!
//! assert_eq!(path.len(), 3);
//! assert_eq!(path.at(1), Some(&Segment::Index(0)));
//! assert!(path.starts_with(&"addresses".parse().unwrap()));
//! assert_eq!(path.to_string(), "addresses[0].city");
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

mod parser;
mod pattern;

pub use parser::{escape_key, format, split};
pub use pattern::FieldPattern;

/// Error raised when a field name cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedPathError {
    /// A `[` without a closing `]`
    #[error("unmatched [ in path: {path}")]
    UnmatchedBracket { path: String },

    /// Bracket content that is not a non-negative integer
    #[error("invalid index [{content}] in path: {path}")]
    InvalidIndex { content: String, path: String },
}

/// One step of a [`Path`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Named key of a mapping
    Key(String),
    /// Zero-based position in a sequence
    Index(usize),
    /// `[]`, the next available slot of a sequence
    Append,
}

impl Segment {
    /// Shorthand for [`Segment::Key`]
    pub fn key(key: impl Into<String>) -> Self {
        Segment::Key(key.into())
    }

    /// Whether this segment addresses a sequence position
    pub fn is_positional(&self) -> bool {
        matches!(self, Segment::Index(_) | Segment::Append)
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            Segment::Key(key) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index(index) => write!(f, "{}", index),
            Segment::Append => f.write_str("[]"),
        }
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Segment::Key(key.to_string())
    }
}

impl From<String> for Segment {
    fn from(key: String) -> Self {
        Segment::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

// Keys serialize as strings, indices as numbers, append as null so no key can collide with it
impl Serialize for Segment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Segment::Key(key) => serializer.serialize_str(key),
            Segment::Index(index) => serializer.serialize_u64(*index as u64),
            Segment::Append => serializer.serialize_unit(),
        }
    }
}

impl<'de> Deserialize<'de> for Segment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Index(u64),
            Key(String),
            Append,
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Index(index) => Segment::Index(index as usize),
            Raw::Key(key) => Segment::Key(key),
            Raw::Append => Segment::Append,
        })
    }
}

/// A parsed field address
///
/// Two paths are equal when their segment sequences are equal, regardless
/// of how the original strings were written or escaped.
#[derive(Debug, Clone, Default)]
pub struct Path {
    key: String,
    segments: Vec<Segment>,
}

impl Path {
    /// The empty path
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a field name
    ///
    /// An empty string yields the empty path.
    pub fn parse(key: &str) -> Result<Self, MalformedPathError> {
        Ok(Self {
            key: key.to_string(),
            segments: split(key)?,
        })
    }

    /// Builds a path from raw segments, rendering its canonical field name
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Segment>,
    {
        let segments: Vec<Segment> = segments.into_iter().map(Into::into).collect();

        Self {
            key: format(&segments),
            segments,
        }
    }

    /// The field name this path was built from
    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment at `index`, if any
    pub fn at(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// A new path with `segment` appended
    pub fn join(&self, segment: impl Into<Segment>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self::from_segments(segments)
    }

    /// The path without its last segment, `None` for the empty path
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.segments.split_last()?;
        Some(Self::from_segments(init.iter().cloned()))
    }

    /// Structural equality
    pub fn is(&self, other: &Path) -> bool {
        self.segments == other.segments
    }

    /// Whether the two paths agree segment by segment over the shorter one's
    /// length, compared from the front
    ///
    /// ```
    /// use intent_forms_path::Path;
    ///
    /// let city = Path::parse("addresses[0].city").unwrap();
    /// assert!(city.starts_with(&Path::parse("addresses").unwrap()));
    /// assert!(city.starts_with(&Path::parse("addresses[0].city.code").unwrap()));
    /// assert!(!city.starts_with(&Path::parse("addresses[1]").unwrap()));
    /// ```
    pub fn starts_with(&self, other: &Path) -> bool {
        self.segments
            .iter()
            .zip(other.segments.iter())
            .all(|(a, b)| a == b)
    }

    /// Like [`Path::starts_with`], anchored at the tail
    pub fn ends_with(&self, other: &Path) -> bool {
        self.segments
            .iter()
            .rev()
            .zip(other.segments.iter().rev())
            .all(|(a, b)| a == b)
    }

    /// Human-readable label
    ///
    /// Indices are shown one-based, keys are split into words on whitespace
    /// and `-_;:,.`, and every word is capitalised.
    ///
    /// ```
    /// use intent_forms_path::Path;
    ///
    /// let path = Path::parse("billing_address.lines[0]").unwrap();
    /// assert_eq!(path.to_pretty_string(" "), "Billing Address Lines 1");
    /// ```
    pub fn to_pretty_string(&self, delimiter: &str) -> String {
        self.to_pretty_string_with(delimiter, |segment| match segment {
            Segment::Index(index) => (index + 1).to_string(),
            Segment::Append => String::new(),
            Segment::Key(key) => key
                .split(|c: char| c.is_whitespace() || matches!(c, '-' | '_' | ';' | ':' | ',' | '.'))
                .filter(|word| !word.is_empty())
                .map(capitalize)
                .collect::<Vec<_>>()
                .join(delimiter),
        })
    }

    /// Label built with a custom segment formatter
    pub fn to_pretty_string_with<F>(&self, delimiter: &str, format_segment: F) -> String
    where
        F: Fn(&Segment) -> String,
    {
        self.segments
            .iter()
            .map(format_segment)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(delimiter)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.is(other)
    }
}

impl Eq for Path {}

impl std::hash::Hash for Path {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl FromStr for Path {
    type Err = MalformedPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl TryFrom<&str> for Path {
    type Error = MalformedPathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Path::parse(value)
    }
}

impl From<Vec<Segment>> for Path {
    fn from(segments: Vec<Segment>) -> Self {
        Path::from_segments(segments)
    }
}

impl From<&[Segment]> for Path {
    fn from(segments: &[Segment]) -> Self {
        Path::from_segments(segments.iter().cloned())
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.segments.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Segment>::deserialize(deserializer).map(Path::from)
    }
}
