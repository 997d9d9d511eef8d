// File: src/lib.rs
// Purpose: Schema-driven form submissions for axum

//! Declare a form once as a [`Schema`] and derive everything else from it:
//! nested values from flattened field names, input constraint attributes,
//! validation issues addressed back to fields, and routing of each
//! submission to the handler for its `_intent`.
//!
//! ```
//! use intent_forms::{FormData, Value};
//!
//! let form: FormData = [("user.name", "Ada"), ("tags[]", "a"), ("tags[]", "b")]
//!     .into_iter()
//!     .collect();
//!
//! let value = form.to_object().unwrap();
//! assert_eq!(value.to_json(), serde_json::json!({"user": {"name": "Ada"}, "tags": ["a", "b"]}));
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod field;
pub mod form_data;
pub mod multipart;
pub mod request;
pub mod response;
pub mod schema;
pub mod upload;
pub mod value;

pub use config::{FormsConfig, Messages, UploadLimit, UploadLimits};
pub use dispatch::{FormDispatcher, Hooks, IntentHandler, Submission};
pub use error::{FormError, Thrown};
pub use field::FieldAttrs;
pub use form_data::{FormData, FormValue};
pub use request::{FormRequest, RequestBody};
pub use response::{FormResponse, Payload, Reply};
pub use schema::{
    to_schema, Issue, IssueCode, Schema, SchemaKind, StringFormat, Validation, ValidationError, DEFAULT_INTENT,
    INTENT_FIELD,
};
pub use upload::{FileUpload, UploadHandler};
pub use value::{pick_from, Value};

pub use intent_forms_path::{escape_key, FieldPattern, MalformedPathError, Path, Segment};
