// File: src/schema/validate.rs
// Purpose: Validation of nested values against the schema tree

use super::{AsyncCheck, Check, Schema, SchemaKind, StringFormat};
use crate::value::{Map, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use intent_forms_path::{FieldPattern, Path};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

// Email validation regex
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
});

// URL validation regex
static URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").unwrap()
});

/// Machine-readable issue code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    InvalidType,
    TooSmall,
    TooBig,
    InvalidString,
    InvalidDate,
    Custom,
}

/// One validation problem, addressed to a field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub path: Path,
    pub code: IssueCode,
    pub message: String,
}

impl Issue {
    pub fn new(path: Path, code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            path,
            code,
            message: message.into(),
        }
    }
}

/// Failed validation: the issues plus the submitted tree for re-population
#[derive(Debug, Clone, PartialEq, Error)]
#[error("validation failed with {} issue(s)", .issues.len())]
pub struct ValidationError {
    pub issues: Vec<Issue>,
    pub input: Value,
}

impl ValidationError {
    /// Issues selected by a message pattern
    pub fn issues_for(&self, pattern: &FieldPattern) -> Vec<&Issue> {
        self.issues.iter().filter(|issue| pattern.matches(&issue.path)).collect()
    }

    /// Issues addressed exactly to `path`
    pub fn issues_at(&self, path: &Path) -> Vec<&Issue> {
        self.issues.iter().filter(|issue| issue.path.is(path)).collect()
    }
}

/// Outcome of validating a value tree; never both data and an error
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Success { data: Value },
    Failure(ValidationError),
}

impl Validation {
    /// Unvalidated result: failure without issues, carrying the input
    pub fn placeholder(input: Value) -> Self {
        Validation::Failure(ValidationError {
            issues: Vec::new(),
            input,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Validation::Success { .. })
    }

    /// Parsed data on success, the submitted input otherwise
    pub fn data(&self) -> &Value {
        match self {
            Validation::Success { data } => data,
            Validation::Failure(error) => &error.input,
        }
    }

    pub fn error(&self) -> Option<&ValidationError> {
        match self {
            Validation::Success { .. } => None,
            Validation::Failure(error) => Some(error),
        }
    }

    pub fn issues(&self) -> &[Issue] {
        match self {
            Validation::Success { .. } => &[],
            Validation::Failure(error) => &error.issues,
        }
    }

    pub fn issues_for(&self, pattern: &FieldPattern) -> Vec<&Issue> {
        self.error().map(|error| error.issues_for(pattern)).unwrap_or_default()
    }
}

impl Serialize for Validation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Issues<'a> {
            issues: &'a [Issue],
        }

        match self {
            Validation::Success { data } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("success", &true)?;
                map.serialize_entry("data", data)?;
                map.end()
            }
            Validation::Failure(error) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("success", &false)?;
                map.serialize_entry("input", &error.input)?;
                map.serialize_entry("error", &Issues { issues: &error.issues })?;
                map.end()
            }
        }
    }
}

/// Parses the date forms HTML inputs submit
///
/// RFC 3339, `YYYY-MM-DDTHH:MM[:SS]`, `YYYY-MM-DD`, `YYYY-MM` and ISO weeks
/// (`YYYY-Www`). Date-only forms resolve to midnight.
pub fn parse_date(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();

    if let Ok(date_time) = DateTime::parse_from_rfc3339(input) {
        return Some(date_time.naive_utc());
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .or_else(|| {
            let date = if input.contains("-W") {
                NaiveDate::parse_from_str(&format!("{}-1", input), "%G-W%V-%u").ok()
            } else {
                NaiveDate::parse_from_str(input, "%Y-%m-%d")
                    .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", input), "%Y-%m-%d"))
                    .ok()
            };
            date.and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// State threaded through one validation pass
#[derive(Default)]
struct Pass {
    issues: Vec<Issue>,
    pending: Vec<(Path, AsyncCheck, Value)>,
}

impl Pass {
    fn issue(&mut self, path: &Path, code: IssueCode, message: impl Into<String>) {
        self.issues.push(Issue::new(path.clone(), code, message));
    }
}

impl Schema {
    /// Validates `input`, running synchronous checks only
    pub fn validate(&self, input: &Value) -> Validation {
        let mut pass = Pass::default();
        let data = self.check_value(Some(input), &Path::root(), &mut pass);

        finish(data, pass.issues, input)
    }

    /// Validates `input`, then awaits every asynchronous check whose node
    /// parsed cleanly
    pub async fn validate_async(&self, input: &Value) -> Validation {
        let mut pass = Pass::default();
        let data = self.check_value(Some(input), &Path::root(), &mut pass);

        let pending = std::mem::take(&mut pass.pending);
        let outcomes = futures::future::join_all(
            pending
                .into_iter()
                .map(|(path, check, value)| async move { (path, check(value).await) }),
        )
        .await;

        for (path, outcome) in outcomes {
            if let Err(message) = outcome {
                pass.issue(&path, IssueCode::Custom, message);
            }
        }

        finish(data, pass.issues, input)
    }

    fn check_value(&self, value: Option<&Value>, path: &Path, pass: &mut Pass) -> Option<Value> {
        let before = pass.issues.len();

        let parsed = match &self.kind {
            SchemaKind::Optional(inner) => {
                if is_absent(value) {
                    return None;
                }
                inner.check_value(value, path, pass)
            }
            SchemaKind::Nullable(inner) => {
                if is_absent(value) {
                    return Some(Value::Null);
                }
                inner.check_value(value, path, pass)
            }
            _ => match value.filter(|v| !v.is_null()) {
                Some(value) => self.check_present(value, path, pass),
                None => {
                    pass.issue(path, IssueCode::InvalidType, "Required");
                    None
                }
            },
        }?;

        if pass.issues.len() == before {
            self.run_checks(&parsed, path, pass);
        }

        Some(parsed)
    }

    fn check_present(&self, value: &Value, path: &Path, pass: &mut Pass) -> Option<Value> {
        match &self.kind {
            SchemaKind::String(rules) => {
                let Value::String(text) = value else {
                    pass.issue(path, IssueCode::InvalidType, expected("string", value));
                    return None;
                };

                let length = text.chars().count();
                if let Some(min) = rules.min_length.filter(|min| length < *min) {
                    pass.issue(path, IssueCode::TooSmall, format!("String must contain at least {} character(s)", min));
                }
                if let Some(max) = rules.max_length.filter(|max| length > *max) {
                    pass.issue(path, IssueCode::TooBig, format!("String must contain at most {} character(s)", max));
                }
                if rules.pattern.as_ref().is_some_and(|pattern| !pattern.is_match(text)) {
                    pass.issue(path, IssueCode::InvalidString, "Invalid");
                }
                match rules.format {
                    Some(StringFormat::Email) if !EMAIL_REGEX.is_match(text) => {
                        pass.issue(path, IssueCode::InvalidString, "Invalid email")
                    }
                    Some(StringFormat::Url) if !URL_REGEX.is_match(text) => {
                        pass.issue(path, IssueCode::InvalidString, "Invalid url")
                    }
                    _ => {}
                }

                Some(value.clone())
            }

            SchemaKind::Number(rules) => {
                let number = match value {
                    Value::Number(n) => Some(*n),
                    Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
                    _ => None,
                };
                let Some(number) = number else {
                    pass.issue(path, IssueCode::InvalidType, expected("number", value));
                    return None;
                };

                if rules.integer && number.fract() != 0.0 {
                    pass.issue(path, IssueCode::InvalidType, "Expected integer, received float");
                }
                if let Some(min) = rules.min.filter(|min| number < *min) {
                    pass.issue(path, IssueCode::TooSmall, format!("Number must be greater than or equal to {}", min));
                }
                if let Some(max) = rules.max.filter(|max| number > *max) {
                    pass.issue(path, IssueCode::TooBig, format!("Number must be less than or equal to {}", max));
                }

                Some(Value::Number(number))
            }

            SchemaKind::Boolean => {
                let flag = match value {
                    Value::Bool(b) => Some(*b),
                    Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                        "true" | "on" | "1" => Some(true),
                        "false" | "off" | "0" => Some(false),
                        _ => None,
                    },
                    _ => None,
                };

                match flag {
                    Some(flag) => Some(Value::Bool(flag)),
                    None => {
                        pass.issue(path, IssueCode::InvalidType, expected("boolean", value));
                        None
                    }
                }
            }

            SchemaKind::Date(rules) => {
                let Value::String(text) = value else {
                    pass.issue(path, IssueCode::InvalidType, expected("date", value));
                    return None;
                };
                let Some(date) = parse_date(text) else {
                    pass.issue(path, IssueCode::InvalidDate, "Invalid date");
                    return None;
                };

                if let Some(min) = rules.min.filter(|min| date < *min) {
                    pass.issue(path, IssueCode::TooSmall, format!("Date must be greater than or equal to {}", min));
                }
                if let Some(max) = rules.max.filter(|max| date > *max) {
                    pass.issue(path, IssueCode::TooBig, format!("Date must be less than or equal to {}", max));
                }

                Some(value.clone())
            }

            SchemaKind::File(rules) => {
                let Value::File(file) = value else {
                    pass.issue(path, IssueCode::InvalidType, expected("file", value));
                    return None;
                };

                if let Some(max) = rules.max_size.filter(|max| file.size() > *max) {
                    pass.issue(path, IssueCode::TooBig, format!("File must be at most {} byte(s)", max));
                }

                Some(value.clone())
            }

            SchemaKind::Array(rules) => {
                let items: Vec<&Value> = match value {
                    Value::Array(items) => items.iter().collect(),
                    Value::Object(_) => {
                        pass.issue(path, IssueCode::InvalidType, expected("array", value));
                        return None;
                    }
                    // A single submitted value for a list field
                    scalar => vec![scalar],
                };

                if let Some(min) = rules.min_items.filter(|min| items.len() < *min) {
                    pass.issue(path, IssueCode::TooSmall, format!("Array must contain at least {} element(s)", min));
                }
                if let Some(max) = rules.max_items.filter(|max| items.len() > *max) {
                    pass.issue(path, IssueCode::TooBig, format!("Array must contain at most {} element(s)", max));
                }

                let parsed = items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| {
                        rules
                            .element
                            .check_value(Some(item), &path.join(index), pass)
                            .unwrap_or(Value::Null)
                    })
                    .collect();

                Some(Value::Array(parsed))
            }

            SchemaKind::Object(rules) => {
                let Value::Object(map) = value else {
                    pass.issue(path, IssueCode::InvalidType, expected("object", value));
                    return None;
                };

                // Unknown keys are stripped
                let mut parsed = Map::new();
                for (key, field) in &rules.fields {
                    if let Some(child) = field.check_value(map.get(key), &path.join(key.as_str()), pass) {
                        parsed.insert(key.clone(), child);
                    }
                }

                Some(Value::Object(parsed))
            }

            SchemaKind::Optional(_) | SchemaKind::Nullable(_) => self.check_value(Some(value), path, pass),
        }
    }

    fn run_checks(&self, parsed: &Value, path: &Path, pass: &mut Pass) {
        for check in &self.checks {
            match check {
                Check::Sync(check) => {
                    if let Err(message) = check(parsed) {
                        pass.issue(path, IssueCode::Custom, message);
                    }
                }
                Check::Async(check) => pass.pending.push((path.clone(), check.clone(), parsed.clone())),
            }
        }
    }
}

fn is_absent(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

fn expected(kind: &str, received: &Value) -> String {
    format!("Expected {}, received {}", kind, received.type_name())
}

fn finish(data: Option<Value>, issues: Vec<Issue>, input: &Value) -> Validation {
    if issues.is_empty() {
        Validation::Success {
            data: data.unwrap_or_default(),
        }
    } else {
        Validation::Failure(ValidationError {
            issues,
            input: input.clone(),
        })
    }
}
