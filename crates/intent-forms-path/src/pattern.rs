//! Message-slot addressing patterns
//!
//! A pattern names which validation issues a message slot displays:
//! `email` matches only that field, `address.*` matches the field and
//! everything nested under it, `*` matches every issue.

use crate::{MalformedPathError, Path};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPattern {
    /// `*`
    Any,
    /// `name`
    Exact(Path),
    /// `name.*`
    Nested(Path),
}

impl FieldPattern {
    pub fn parse(pattern: &str) -> Result<Self, MalformedPathError> {
        let pattern = pattern.trim();

        if pattern == "*" {
            return Ok(FieldPattern::Any);
        }

        // An escaped `\*` is a literal key, not a wildcard
        match pattern.strip_suffix(".*") {
            Some(prefix) if !prefix.ends_with('\\') => Ok(FieldPattern::Nested(Path::parse(prefix)?)),
            _ => Ok(FieldPattern::Exact(Path::parse(pattern)?)),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        match self {
            FieldPattern::Any => true,
            FieldPattern::Exact(expected) => expected.is(path),
            FieldPattern::Nested(prefix) => path.len() >= prefix.len() && path.starts_with(prefix),
        }
    }
}

impl FromStr for FieldPattern {
    type Err = MalformedPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldPattern::parse(s)
    }
}

impl From<Path> for FieldPattern {
    fn from(path: Path) -> Self {
        FieldPattern::Exact(path)
    }
}

impl fmt::Display for FieldPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPattern::Any => f.write_str("*"),
            FieldPattern::Exact(path) => write!(f, "{}", path),
            FieldPattern::Nested(path) if path.is_empty() => f.write_str("*"),
            FieldPattern::Nested(path) => write!(f, "{}.*", path),
        }
    }
}
