// File: src/form_data.rs
// Purpose: Flattened field set and its conversion to and from nested values

use crate::upload::FileUpload;
use crate::value::{Map, Value};
use intent_forms_path::{MalformedPathError, Path, Segment};
use serde_json::Value as JsonValue;
use std::mem;
use tracing::{debug, warn};

/// A single submitted value
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File(FileUpload),
}

impl FormValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FormValue::Text(text) => Some(text),
            FormValue::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileUpload> {
        match self {
            FormValue::File(file) => Some(file),
            FormValue::Text(_) => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            FormValue::Text(text) => Some(text),
            FormValue::File(_) => None,
        }
    }
}

impl From<FormValue> for Value {
    fn from(value: FormValue) -> Self {
        match value {
            FormValue::Text(text) => Value::String(text),
            FormValue::File(file) => Value::File(file),
        }
    }
}

impl From<&str> for FormValue {
    fn from(text: &str) -> Self {
        FormValue::Text(text.to_string())
    }
}

impl From<String> for FormValue {
    fn from(text: String) -> Self {
        FormValue::Text(text)
    }
}

impl From<FileUpload> for FormValue {
    fn from(file: FileUpload) -> Self {
        FormValue::File(file)
    }
}

/// Ordered field-name/value pairs exactly as submitted
///
/// Names are serialized [`Path`]s (`addresses[0].city`, `tags[]`). Order is
/// significant: repeated `[]` entries accumulate in submission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    entries: Vec<(String, FormValue)>,
}

impl FormData {
    /// Create empty form data
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), FormValue::Text(value.into())));
    }

    pub fn append_file(&mut self, key: impl Into<String>, file: FileUpload) {
        self.entries.push((key.into(), FormValue::File(file)));
    }

    pub fn append_value(&mut self, key: impl Into<String>, value: FormValue) {
        self.entries.push((key.into(), value));
    }

    /// First value submitted under `key`
    pub fn get(&self, key: &str) -> Option<&FormValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// First text value submitted under `key`
    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_text()
    }

    /// Get a form field as a specific type
    pub fn get_as<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get_text(key)?.parse().ok()
    }

    /// Every value submitted under `key`, in order
    pub fn get_all(&self, key: &str) -> Vec<&FormValue> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect()
    }

    /// Removes every entry under `key`
    pub fn delete(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    /// Removes every entry under `key`, returning the first value
    pub fn remove(&mut self, key: &str) -> Option<FormValue> {
        let first = self.entries.iter().position(|(k, _)| k == key)?;
        let (_, value) = self.entries.remove(first);
        self.delete(key);
        Some(value)
    }

    /// Check if a field exists
    pub fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Distinct field names in first-submission order
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (key, _) in &self.entries {
            if !keys.contains(&key.as_str()) {
                keys.push(key);
            }
        }
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse an `application/x-www-form-urlencoded` body
    ///
    /// `+` decodes to a space; pairs without `=` get an empty value.
    pub fn from_urlencoded(body: &str) -> Self {
        body.split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_component(key), FormValue::Text(decode_component(value)))
            })
            .collect()
    }

    /// Flatten a JSON body into field names
    pub fn from_json(json: &JsonValue) -> Self {
        Self::from_object(&Value::from(json.clone()))
    }

    /// Flatten a nested value into `a.b` / `a[0]` field names
    ///
    /// `Null` leaves are skipped, scalars become text, files stay files.
    pub fn from_object(value: &Value) -> Self {
        let mut form_data = FormData::new();
        flatten(value, &mut Vec::new(), &mut form_data);
        form_data
    }

    /// Convert to a nested value tree
    pub fn to_object(&self) -> Result<Value, MalformedPathError> {
        self.to_object_with(|_, _, _| None)
    }

    /// Convert to a nested value tree, coercing values through `transform`
    ///
    /// `transform` receives the raw field name, the raw value and the parsed
    /// segments; `Some` replaces the value that gets placed.
    ///
    /// Entries are placed strictly in submission order. Collisions resolve
    /// as follows: a repeated plain assignment overwrites (last write wins),
    /// a scalar that must be descended through is replaced by a container,
    /// and a scalar or object addressed with `[]` becomes a one-element array
    /// before the new value is appended.
    pub fn to_object_with<F>(&self, transform: F) -> Result<Value, MalformedPathError>
    where
        F: Fn(&str, &FormValue, &[Segment]) -> Option<Value>,
    {
        let mut root = Value::object();

        for (key, raw) in &self.entries {
            let path = Path::parse(key)?;

            if path.is_empty() {
                debug!(field = %key, "skipping form entry without a name");
                continue;
            }

            let value = transform(key, raw, path.segments()).unwrap_or_else(|| raw.clone().into());
            place(&mut root, path.segments(), value, key);
        }

        Ok(root)
    }
}

impl<K: Into<String>, V: Into<FormValue>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl IntoIterator for FormData {
    type Item = (String, FormValue);
    type IntoIter = std::vec::IntoIter<(String, FormValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

fn flatten(value: &Value, segments: &mut Vec<Segment>, out: &mut FormData) {
    match value {
        Value::Null => {}
        Value::File(file) => out.append_file(intent_forms_path::format(segments), file.clone()),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                segments.push(Segment::Index(index));
                flatten(item, segments, out);
                segments.pop();
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                segments.push(Segment::key(key.as_str()));
                flatten(item, segments, out);
                segments.pop();
            }
        }
        scalar => out.append(intent_forms_path::format(segments), scalar.to_string()),
    }
}

/// Empty container shaped for the segment that will address it
fn container_for(next: &Segment) -> Value {
    if next.is_positional() {
        Value::Array(Vec::new())
    } else {
        Value::object()
    }
}

fn place(slot: &mut Value, segments: &[Segment], value: Value, field: &str) {
    let Some((segment, rest)) = segments.split_first() else {
        return;
    };

    match rest.first() {
        None => assign(slot, segment, value, field),
        Some(next) => {
            let child = descend(slot, segment, next, field);
            place(child, rest, value, field);
        }
    }
}

/// Child slot addressed by `segment`, made ready to be addressed by `next`
fn descend<'a>(slot: &'a mut Value, segment: &Segment, next: &Segment, field: &str) -> &'a mut Value {
    prepare(slot, segment, field);

    let child = match slot {
        Value::Array(items) => match segment {
            Segment::Index(index) => padded(items, *index),
            // Append, or a key against an array: open a new slot
            _ => pushed(items),
        },
        Value::Object(map) => map.entry(object_key(segment)).or_insert(Value::Null),
        other => other,
    };

    if !child.is_container() {
        if !child.is_null() {
            warn!(field = %field, discarded = %child, "replacing scalar form value with nested container");
        }
        *child = container_for(next);
    }

    child
}

fn assign(slot: &mut Value, segment: &Segment, value: Value, field: &str) {
    prepare(slot, segment, field);

    match slot {
        Value::Array(items) => match segment {
            Segment::Index(index) => overwrite(padded(items, *index), value, field),
            _ => items.push(value),
        },
        Value::Object(map) => match map.get_mut(&object_key(segment)) {
            Some(existing) => overwrite(existing, value, field),
            None => {
                map.insert(object_key(segment), value);
            }
        },
        _ => {}
    }
}

/// Makes `slot` a container `segment` can address
fn prepare(slot: &mut Value, segment: &Segment, field: &str) {
    if matches!(segment, Segment::Append) {
        match slot {
            Value::Array(_) => {}
            Value::Null => *slot = Value::Array(Vec::new()),
            Value::Object(map) if map.is_empty() => *slot = Value::Array(Vec::new()),
            _ => {
                debug!(field = %field, "coercing existing value into an array");
                let existing = mem::take(slot);
                *slot = Value::Array(vec![existing]);
            }
        }
    } else if !slot.is_container() {
        if !slot.is_null() {
            warn!(field = %field, discarded = %slot, "replacing scalar form value with nested container");
        }
        *slot = container_for(segment);
    }
}

fn overwrite(existing: &mut Value, value: Value, field: &str) {
    if existing.is_container() {
        warn!(field = %field, "overwriting nested form value");
    } else if !existing.is_null() {
        debug!(field = %field, previous = %existing, "last write wins");
    }
    *existing = value;
}

fn object_key(segment: &Segment) -> String {
    match segment {
        Segment::Key(key) => key.clone(),
        Segment::Index(index) => index.to_string(),
        Segment::Append => String::new(),
    }
}

fn padded(items: &mut Vec<Value>, index: usize) -> &mut Value {
    if items.len() <= index {
        items.resize(index + 1, Value::Null);
    }
    &mut items[index]
}

fn pushed(items: &mut Vec<Value>) -> &mut Value {
    items.push(Value::Null);
    let last = items.len() - 1;
    &mut items[last]
}
