// File: src/field.rs
// Purpose: HTML input attributes derived from the schema node a field name resolves to

use crate::response::FormResponse;
use crate::schema::{Schema, SchemaKind, StringFormat};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use intent_forms_path::{MalformedPathError, Path};
use maud::{html, Markup, PreEscaped};
use serde_json::{json, Map as JsonMap, Value as JsonValue};

/// Attributes for one form input
///
/// Derived attributes never replace ones already present, so explicit
/// attributes set with [`FieldAttrs::with_attr`] always win.
///
/// ```
/// use intent_forms::{FieldAttrs, Schema};
///
/// let schema = Schema::object([("name", Schema::string().min_length(2))]);
/// let attrs = FieldAttrs::derive("name", &schema, "text").unwrap();
///
/// assert_eq!(attrs.get("required"), Some(""));
/// assert_eq!(attrs.get("minlength"), Some("2"));
/// assert_eq!(attrs.label, "Name");
/// ```
#[derive(Debug, Clone, Default)]
pub struct FieldAttrs {
    /// HTML attributes in insertion order; empty values render as bare attributes
    pub html5_attrs: IndexMap<String, String>,
    /// JSON for the data-validate attribute (client-side validation)
    pub data_validate: String,
    /// Field label for display
    pub label: String,
    path: Path,
}

impl FieldAttrs {
    /// Attributes for input `name` of `input_type`, constrained by the node
    /// `name` resolves to in `schema`
    pub fn derive(name: &str, schema: &Schema, input_type: &str) -> Result<Self, MalformedPathError> {
        let path = Path::parse(name)?;
        let mut attrs = Self {
            label: path.to_pretty_string(" "),
            path,
            ..Self::default()
        };

        attrs.insert("name", name);
        if !input_type.is_empty() {
            attrs.insert("type", input_type);
        }
        if input_type != "hidden" {
            attrs.insert("tabindex", "0");
        }

        let mut rules = JsonMap::new();

        if let Some(shape) = schema.resolve(&attrs.path) {
            attrs.apply_shape(shape, input_type, &mut rules);
        }

        attrs.data_validate = JsonValue::Object(rules).to_string();
        Ok(attrs)
    }

    fn apply_shape(&mut self, shape: &Schema, input_type: &str, rules: &mut JsonMap<String, JsonValue>) {
        if !shape.is_optional() && !shape.is_nullable() {
            self.insert("required", "");
            rules.insert("required".to_string(), json!(true));
        }

        if let Some(description) = shape.description() {
            self.insert("title", description);
            self.label = description.to_string();
        }

        match &shape.unwrapped().kind {
            SchemaKind::String(s) => {
                if let Some(min) = s.min_length {
                    self.insert("minlength", min.to_string());
                    rules.insert("minLength".to_string(), json!(min));
                }
                if let Some(max) = s.max_length {
                    self.insert("maxlength", max.to_string());
                    rules.insert("maxLength".to_string(), json!(max));
                }
                if let Some(pattern) = &s.pattern {
                    self.insert("pattern", pattern.as_str());
                    rules.insert("pattern".to_string(), json!(pattern.as_str()));
                }
                match s.format {
                    Some(StringFormat::Email) => {
                        rules.insert("email".to_string(), json!(true));
                    }
                    Some(StringFormat::Url) => {
                        rules.insert("url".to_string(), json!(true));
                    }
                    None => {}
                }
            }
            SchemaKind::Number(n) => {
                if let Some(min) = n.min {
                    self.insert("min", min.to_string());
                    rules.insert("min".to_string(), json!(min));
                }
                if let Some(max) = n.max {
                    self.insert("max", max.to_string());
                    rules.insert("max".to_string(), json!(max));
                }
                if n.integer {
                    self.insert("step", "1");
                    rules.insert("integer".to_string(), json!(true));
                }
            }
            SchemaKind::Array(a) => {
                if let Some(min) = a.min_items {
                    self.insert("min", min.to_string());
                    rules.insert("minItems".to_string(), json!(min));
                }
                if let Some(max) = a.max_items {
                    self.insert("max", max.to_string());
                    rules.insert("maxItems".to_string(), json!(max));
                }
            }
            SchemaKind::Date(d) => {
                if let Some(min) = d.min {
                    let formatted = format_date(min, input_type);
                    rules.insert("minDate".to_string(), json!(formatted));
                    self.insert("min", formatted);
                }
                if let Some(max) = d.max {
                    let formatted = format_date(max, input_type);
                    rules.insert("maxDate".to_string(), json!(formatted));
                    self.insert("max", formatted);
                }
            }
            SchemaKind::File(f) => {
                if let Some(max) = f.max_size {
                    rules.insert("maxSize".to_string(), json!(max));
                }
            }
            _ => {}
        }

        match input_type {
            "date" => self.insert("step", "1"),
            "month" => self.insert("step", "12"),
            _ => {}
        }
    }

    /// Fills in state from the last response: the submitted or parsed value
    /// and `aria-invalid` when an issue is addressed to this exact field
    pub fn with_response(mut self, response: &FormResponse) -> Self {
        let kind = self.get("type").unwrap_or_default();
        let takes_value = !matches!(kind, "file" | "password" | "checkbox" | "radio");

        if takes_value {
            if let Some(value) = response
                .validation
                .data()
                .pick(&self.path)
                .and_then(|value| value.to_attr_value())
            {
                self.insert("value", value);
            }
        }

        let invalid = response
            .validation
            .error()
            .map(|error| !error.issues_at(&self.path).is_empty())
            .unwrap_or(false);

        if invalid {
            self.insert("aria-invalid", "true");
        }

        self
    }

    /// Sets an attribute, replacing any derived value
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.html5_attrs.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.html5_attrs.get(name).map(String::as_str)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.html5_attrs
            .entry(name.to_string())
            .or_insert_with(|| value.into());
    }

    /// Render HTML5 attributes as a string
    pub fn render_html5_attrs(&self) -> String {
        self.html5_attrs
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{}=\"{}\"", k, escape(v))
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Render data-validate attribute
    pub fn render_data_validate(&self) -> String {
        format!("data-validate=\"{}\"", escape(&self.data_validate))
    }

    /// Render all attributes (HTML5 + data-validate)
    pub fn render_all(&self) -> String {
        let html5 = self.render_html5_attrs();
        let validate = self.render_data_validate();

        if html5.is_empty() {
            validate
        } else {
            format!("{} {}", html5, validate)
        }
    }

    /// `<input>` element carrying every attribute
    pub fn input(&self) -> Markup {
        PreEscaped(format!("<input {}>", self.render_all()))
    }

    /// `<label>` element for the input
    pub fn label_for(&self) -> Markup {
        html! {
            label for=(self.path.as_str()) { (self.label) }
        }
    }
}

fn escape(value: &str) -> String {
    html! { (value) }.into_string()
}

/// Formats a date bound the way the given input type expects
fn format_date(date: NaiveDateTime, input_type: &str) -> String {
    let format = match input_type {
        "datetime-local" => "%Y-%m-%dT%H:%M",
        "time" => "%H:%M",
        "week" => "%G-W%V",
        "month" => "%Y-%m",
        _ => "%Y-%m-%d",
    };

    date.format(format).to_string()
}
