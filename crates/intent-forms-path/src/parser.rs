//! Field-name parsing and formatting
//!
//! Pure functions that convert between the wire form of a field name
//! (`addresses[0].city`, `tags[]`, `foo\.bar`) and its segment sequence.

use crate::{MalformedPathError, Segment};

/// Characters that carry meaning in a field name and must be escaped in keys
const RESERVED: [char; 4] = ['\\', '.', '[', ']'];

/// Moves a non-empty token into the segment list
///
/// Empty tokens come from consecutive or leading delimiters and are dropped.
fn flush(token: &mut String, segments: &mut Vec<Segment>) {
    if !token.is_empty() {
        segments.push(Segment::Key(std::mem::take(token)));
    }
}

/// Splits a field name into segments
///
/// Single left-to-right scan:
///
/// - `\x` appends `x` literally to the current key
/// - `.` ends the current key
/// - `[]` ends the current key and emits [`Segment::Append`]
/// - `[n]` ends the current key and emits [`Segment::Index`]
///
/// # Examples
///
/// ```
/// use intent_forms_path::{split, Segment};
///
/// assert_eq!(
///     split("foo[0].bar[].baz").unwrap(),
///     vec![
///         Segment::key("foo"),
///         Segment::Index(0),
///         Segment::key("bar"),
///         Segment::Append,
///         Segment::key("baz"),
///     ]
/// );
/// assert_eq!(split(r"foo\.bar.baz").unwrap(), vec![Segment::key("foo.bar"), Segment::key("baz")]);
/// assert!(split("").unwrap().is_empty());
/// ```
///
/// # Errors
///
/// [`MalformedPathError::UnmatchedBracket`] when a `[` never closes, and
/// [`MalformedPathError::InvalidIndex`] when the bracket content is not a
/// non-negative base-10 integer.
pub fn split(path: &str) -> Result<Vec<Segment>, MalformedPathError> {
    let mut segments = Vec::new();
    let mut token = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                // A trailing backslash escapes nothing
                if let Some(escaped) = chars.next() {
                    token.push(escaped);
                }
            }
            '.' => flush(&mut token, &mut segments),
            '[' if chars.peek() == Some(&']') => {
                chars.next();
                flush(&mut token, &mut segments);
                segments.push(Segment::Append);
            }
            '[' => {
                let mut content = String::new();
                let mut closed = false;

                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            content.push('\\');
                            if let Some(escaped) = chars.next() {
                                content.push(escaped);
                            }
                        }
                        ']' => {
                            closed = true;
                            break;
                        }
                        _ => content.push(c),
                    }
                }

                if !closed {
                    return Err(MalformedPathError::UnmatchedBracket {
                        path: path.to_string(),
                    });
                }

                let index = parse_index(&content).ok_or_else(|| MalformedPathError::InvalidIndex {
                    content: content.clone(),
                    path: path.to_string(),
                })?;

                flush(&mut token, &mut segments);
                segments.push(Segment::Index(index));
            }
            _ => token.push(c),
        }
    }

    flush(&mut token, &mut segments);

    Ok(segments)
}

/// Parses bracket content as a non-negative base-10 integer
fn parse_index(content: &str) -> Option<usize> {
    if content.is_empty() || !content.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    content.parse().ok()
}

/// Escapes the reserved characters of a key
pub fn escape_key(key: &str) -> String {
    if !key.contains(RESERVED) {
        return key.to_string();
    }

    key.chars().fold(String::with_capacity(key.len() + 4), |mut out, c| {
        if RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
        out
    })
}

/// Formats a segment sequence as a field name
///
/// Keys render as `.key`, indices as `[n]`, the append marker as `[]`;
/// one leading `.` is stripped. Reserved characters in keys are escaped,
/// so [`split`] of the result yields the same segments for every sequence
/// without empty keys.
///
/// ```
/// use intent_forms_path::{format, Segment};
///
/// let segments = vec![Segment::key("addresses"), Segment::Index(0), Segment::key("city")];
/// assert_eq!(format(&segments), "addresses[0].city");
/// ```
pub fn format(segments: &[Segment]) -> String {
    let joined = segments
        .iter()
        .map(|segment| match segment {
            Segment::Key(key) => format!(".{}", escape_key(key)),
            Segment::Index(index) => format!("[{}]", index),
            Segment::Append => "[]".to_string(),
        })
        .collect::<String>();

    match joined.strip_prefix('.') {
        Some(stripped) => stripped.to_string(),
        None => joined,
    }
}
