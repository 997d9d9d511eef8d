// File: src/schema/mod.rs
// Purpose: Schema shape tree, builders and address-to-schema resolution

use crate::value::Value;
use chrono::NaiveDateTime;
use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use intent_forms_path::{Path, Segment};
use regex::Regex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

mod validate;

pub use validate::{parse_date, Issue, IssueCode, Validation, ValidationError};

/// Reserved field carrying the submission intent
pub const INTENT_FIELD: &str = "_intent";

/// Intent used when a submission carries none
pub const DEFAULT_INTENT: &str = "default";

/// Custom synchronous check; `Err` carries the issue message
pub type SyncCheck = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Custom asynchronous check, awaited after the synchronous pass
pub type AsyncCheck = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

#[derive(Clone)]
pub enum Check {
    Sync(SyncCheck),
    Async(AsyncCheck),
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Sync(_) => f.write_str("Check::Sync"),
            Check::Async(_) => f.write_str("Check::Async"),
        }
    }
}

/// Well-known string formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Email,
    Url,
}

#[derive(Debug, Clone, Default)]
pub struct StringSchema {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Regex>,
    pub format: Option<StringFormat>,
}

#[derive(Debug, Clone, Default)]
pub struct NumberSchema {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub integer: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DateSchema {
    pub min: Option<NaiveDateTime>,
    pub max: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct FileSchema {
    /// Bytes
    pub max_size: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ArraySchema {
    pub element: Box<Schema>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    pub fields: IndexMap<String, Schema>,
}

/// Closed set of node kinds
#[derive(Debug, Clone)]
pub enum SchemaKind {
    String(StringSchema),
    Number(NumberSchema),
    Boolean,
    Date(DateSchema),
    File(FileSchema),
    Array(ArraySchema),
    Object(ObjectSchema),
    Optional(Box<Schema>),
    Nullable(Box<Schema>),
}

/// A node of the schema shape tree
///
/// Constraint builders (`min_length`, `min`, `min_date`, ...) apply to the
/// innermost node, looking through `optional()`/`nullable()` wrappers, and
/// are ignored on node kinds they do not describe.
///
/// ```
/// use intent_forms::Schema;
///
/// let schema = Schema::intents([
///     ("createUser", Schema::object([
///         ("name", Schema::string().min_length(1)),
///         ("age", Schema::integer().min(0.0).optional()),
///     ])),
/// ]);
///
/// let age = schema.resolve(&"createUser.age".parse().unwrap()).unwrap();
/// assert!(age.is_optional());
/// ```
#[derive(Debug, Clone)]
pub struct Schema {
    pub kind: SchemaKind,
    pub description: Option<String>,
    checks: Vec<Check>,
}

impl Schema {
    fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            description: None,
            checks: Vec::new(),
        }
    }

    pub fn string() -> Self {
        Self::new(SchemaKind::String(StringSchema::default()))
    }

    pub fn email() -> Self {
        Self::string().format(StringFormat::Email)
    }

    pub fn url() -> Self {
        Self::string().format(StringFormat::Url)
    }

    pub fn number() -> Self {
        Self::new(SchemaKind::Number(NumberSchema::default()))
    }

    pub fn integer() -> Self {
        Self::new(SchemaKind::Number(NumberSchema {
            integer: true,
            ..NumberSchema::default()
        }))
    }

    pub fn boolean() -> Self {
        Self::new(SchemaKind::Boolean)
    }

    pub fn date() -> Self {
        Self::new(SchemaKind::Date(DateSchema::default()))
    }

    pub fn file() -> Self {
        Self::new(SchemaKind::File(FileSchema::default()))
    }

    pub fn array(element: Schema) -> Self {
        Self::new(SchemaKind::Array(ArraySchema {
            element: Box::new(element),
            min_items: None,
            max_items: None,
        }))
    }

    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Schema)>,
    {
        Self::new(SchemaKind::Object(ObjectSchema {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }))
    }

    /// Intent-keyed mapping: one sub-schema per intent plus the reserved
    /// `_intent` string field
    pub fn intents<K, I>(intents: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Schema)>,
    {
        let mut fields = IndexMap::new();
        fields.insert(INTENT_FIELD.to_string(), Schema::string());
        fields.extend(intents.into_iter().map(|(k, v)| (k.into(), v)));

        Self::new(SchemaKind::Object(ObjectSchema { fields }))
    }

    pub fn optional(self) -> Self {
        Self::new(SchemaKind::Optional(Box::new(self)))
    }

    pub fn nullable(self) -> Self {
        Self::new(SchemaKind::Nullable(Box::new(self)))
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a custom check, run when the node parsed without issues
    pub fn check<F>(mut self, check: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.checks.push(Check::Sync(Arc::new(check)));
        self
    }

    /// Attach an asynchronous custom check, only run by [`Schema::validate_async`]
    pub fn check_async<F, Fut>(mut self, check: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.checks
            .push(Check::Async(Arc::new(move |value| check(value).boxed())));
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        if let SchemaKind::String(s) = leaf_kind_mut(&mut self.kind) {
            s.min_length = Some(min);
        }
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        if let SchemaKind::String(s) = leaf_kind_mut(&mut self.kind) {
            s.max_length = Some(max);
        }
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        if let SchemaKind::String(s) = leaf_kind_mut(&mut self.kind) {
            s.pattern = Some(pattern);
        }
        self
    }

    pub fn format(mut self, format: StringFormat) -> Self {
        if let SchemaKind::String(s) = leaf_kind_mut(&mut self.kind) {
            s.format = Some(format);
        }
        self
    }

    /// Lower bound for numbers, minimum item count for arrays
    pub fn min(mut self, min: f64) -> Self {
        match leaf_kind_mut(&mut self.kind) {
            SchemaKind::Number(n) => n.min = Some(min),
            SchemaKind::Array(a) => a.min_items = Some(min.max(0.0) as usize),
            _ => {}
        }
        self
    }

    /// Upper bound for numbers, maximum item count for arrays
    pub fn max(mut self, max: f64) -> Self {
        match leaf_kind_mut(&mut self.kind) {
            SchemaKind::Number(n) => n.max = Some(max),
            SchemaKind::Array(a) => a.max_items = Some(max.max(0.0) as usize),
            _ => {}
        }
        self
    }

    pub fn min_date(mut self, min: NaiveDateTime) -> Self {
        if let SchemaKind::Date(d) = leaf_kind_mut(&mut self.kind) {
            d.min = Some(min);
        }
        self
    }

    pub fn max_date(mut self, max: NaiveDateTime) -> Self {
        if let SchemaKind::Date(d) = leaf_kind_mut(&mut self.kind) {
            d.max = Some(max);
        }
        self
    }

    pub fn max_size(mut self, bytes: usize) -> Self {
        if let SchemaKind::File(f) = leaf_kind_mut(&mut self.kind) {
            f.max_size = Some(bytes);
        }
        self
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Whether an `optional()` wrapper surrounds the node
    pub fn is_optional(&self) -> bool {
        match &self.kind {
            SchemaKind::Optional(_) => true,
            SchemaKind::Nullable(inner) => inner.is_optional(),
            _ => false,
        }
    }

    /// Whether a `nullable()` wrapper surrounds the node
    pub fn is_nullable(&self) -> bool {
        match &self.kind {
            SchemaKind::Nullable(_) => true,
            SchemaKind::Optional(inner) => inner.is_nullable(),
            _ => false,
        }
    }

    /// The node with optional/nullable wrappers removed
    pub fn unwrapped(&self) -> &Schema {
        match &self.kind {
            SchemaKind::Optional(inner) | SchemaKind::Nullable(inner) => inner.unwrapped(),
            _ => self,
        }
    }

    /// Own description, or the wrapped node's
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref().or_else(|| match &self.kind {
            SchemaKind::Optional(inner) | SchemaKind::Nullable(inner) => inner.description(),
            _ => None,
        })
    }

    /// Named child of an object node
    pub fn field(&self, key: &str) -> Option<&Schema> {
        match &self.unwrapped().kind {
            SchemaKind::Object(object) => object.fields.get(key),
            _ => None,
        }
    }

    /// Sub-schema registered for `intent`; the reserved `_intent` field is not an intent
    pub fn intent(&self, intent: &str) -> Option<&Schema> {
        if intent == INTENT_FIELD {
            return None;
        }
        self.field(intent)
    }

    /// Resolves `path` to the addressed node
    ///
    /// Index and append segments descend into an array's element schema, key
    /// segments into an object's named child, looking through optional and
    /// nullable wrappers when the wrapped node can descend. A segment that
    /// cannot descend leaves the current node unchanged, so the result is the
    /// deepest node reachable. The empty path yields `None`.
    pub fn resolve(&self, path: &Path) -> Option<&Schema> {
        if path.is_empty() {
            return None;
        }

        Some(
            path.segments()
                .iter()
                .fold(self, |current, segment| current.step(segment).unwrap_or(current)),
        )
    }

    fn step(&self, segment: &Segment) -> Option<&Schema> {
        match (&self.kind, segment) {
            (SchemaKind::Array(array), Segment::Index(_) | Segment::Append) => Some(array.element.as_ref()),
            (SchemaKind::Object(object), Segment::Key(key)) => object.fields.get(key),
            (SchemaKind::Optional(inner) | SchemaKind::Nullable(inner), _) => inner.step(segment),
            _ => None,
        }
    }
}

fn leaf_kind_mut(kind: &mut SchemaKind) -> &mut SchemaKind {
    match kind {
        SchemaKind::Optional(inner) | SchemaKind::Nullable(inner) => leaf_kind_mut(&mut inner.kind),
        other => other,
    }
}

/// Free-function form of [`Schema::resolve`]
pub fn to_schema<'a>(path: &Path, schema: &'a Schema) -> Option<&'a Schema> {
    schema.resolve(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    fn user_schema() -> Schema {
        Schema::object([
            ("name", Schema::string().min_length(2)),
            (
                "addresses",
                Schema::array(Schema::object([("city", Schema::string()), ("zip", Schema::string().max_length(5))])),
            ),
            ("tags", Schema::array(Schema::string()).optional()),
            ("profile", Schema::object([("bio", Schema::string())]).nullable()),
        ])
    }

    fn kind_name(schema: &Schema) -> &'static str {
        match &schema.kind {
            SchemaKind::String(_) => "string",
            SchemaKind::Number(_) => "number",
            SchemaKind::Boolean => "boolean",
            SchemaKind::Date(_) => "date",
            SchemaKind::File(_) => "file",
            SchemaKind::Array(_) => "array",
            SchemaKind::Object(_) => "object",
            SchemaKind::Optional(_) => "optional",
            SchemaKind::Nullable(_) => "nullable",
        }
    }

    #[test]
    fn test_resolve_key_and_index() {
        let schema = user_schema();
        let zip = schema.resolve(&path("addresses[0].zip")).unwrap();
        match &zip.kind {
            SchemaKind::String(s) => assert_eq!(s.max_length, Some(5)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(kind_name(schema.resolve(&path("addresses[].city")).unwrap()), "string");
    }

    #[test]
    fn test_resolve_empty_path() {
        assert!(user_schema().resolve(&Path::root()).is_none());
    }

    #[test]
    fn test_resolve_falls_back_to_nearest_ancestor() {
        let schema = user_schema();
        // Unknown key under an object stays at the object
        assert_eq!(kind_name(schema.resolve(&path("addresses[0].country")).unwrap()), "object");
        // Index against a string node is a no-op
        assert_eq!(kind_name(schema.resolve(&path("name[0]")).unwrap()), "string");
        // Unknown top-level key stays at the root
        assert!(std::ptr::eq(schema.resolve(&path("nope")).unwrap(), &schema));
    }

    #[test]
    fn test_resolve_looks_through_wrappers() {
        let schema = user_schema();
        assert_eq!(kind_name(schema.resolve(&path("tags[]")).unwrap()), "string");
        assert_eq!(kind_name(schema.resolve(&path("profile.bio")).unwrap()), "string");
        // The wrapper itself when nothing below is addressed
        let tags = schema.resolve(&path("tags")).unwrap();
        assert!(tags.is_optional());
        assert_eq!(kind_name(tags.unwrapped()), "array");
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let schema = user_schema();
        let first = schema.resolve(&path("addresses[3].city")).unwrap();
        let second = schema.resolve(&path("addresses[3].city")).unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_builders_apply_through_wrappers() {
        let schema = Schema::string().optional().min_length(3);
        match &schema.unwrapped().kind {
            SchemaKind::String(s) => assert_eq!(s.min_length, Some(3)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(schema.is_optional());
        assert!(!schema.is_nullable());
    }

    #[test]
    fn test_intents_reserve_intent_field() {
        let schema = Schema::intents([("createUser", user_schema())]);
        assert!(schema.field(INTENT_FIELD).is_some());
        assert!(schema.intent(INTENT_FIELD).is_none());
        assert!(schema.intent("createUser").is_some());
        assert!(schema.intent("deleteUser").is_none());
    }

    #[test]
    fn test_description_through_wrapper() {
        let schema = Schema::string().describe("Your full name").optional();
        assert_eq!(schema.description(), Some("Your full name"));
    }
}
