// File: src/response.rs
// Purpose: Response envelope and the reply returned by a dispatch

use crate::schema::Validation;
use crate::value::Value;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Status codes an envelope may carry
const STATUS_CATALOG: &[u16] = &[
    100, 101, 102, 103, //
    200, 201, 202, 203, 204, 205, 206, 207, 208, 226, //
    300, 301, 302, 303, 304, 307, 308, //
    400, 401, 402, 403, 404, 405, 406, 407, 408, 409, 410, 411, 412, 413, 414, 415, 416, 417, 418,
    421, 422, 423, 424, 425, 426, 428, 429, 431, 451, //
    500, 501, 502, 503, 504, 505, 506, 507, 508, 510, 511,
];

/// Envelope payload
#[derive(Clone, Default)]
pub enum Payload {
    #[default]
    Empty,
    Json(JsonValue),
    /// A handler error, kept for inspection
    Error(Arc<anyhow::Error>),
}

impl Payload {
    pub fn error(error: anyhow::Error) -> Self {
        Payload::Error(Arc::new(error))
    }

    pub fn as_error(&self) -> Option<&anyhow::Error> {
        match self {
            Payload::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => f.write_str("Empty"),
            Payload::Json(json) => f.debug_tuple("Json").field(json).finish(),
            Payload::Error(error) => f.debug_tuple("Error").field(&format!("{:#}", error)).finish(),
        }
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Payload::Empty => serializer.serialize_unit(),
            Payload::Json(json) => json.serialize(serializer),
            Payload::Error(error) => serializer.serialize_str(&error.to_string()),
        }
    }
}

impl From<JsonValue> for Payload {
    fn from(json: JsonValue) -> Self {
        Payload::Json(json)
    }
}

/// The uniform `{intent, message, payload, status, validation}` result of a dispatch
#[derive(Debug, Clone)]
pub struct FormResponse {
    pub intent: String,
    pub message: String,
    pub payload: Payload,
    pub status: StatusCode,
    pub validation: Validation,
}

impl FormResponse {
    /// A 200 envelope with an unvalidated placeholder result
    pub fn new(intent: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            message: message.into(),
            payload: Payload::Empty,
            status: StatusCode::OK,
            validation: Validation::placeholder(Value::Null),
        }
    }

    /// Status from the envelope catalog, `None` for any other code
    pub fn status_code(code: u16) -> Option<StatusCode> {
        STATUS_CATALOG
            .contains(&code)
            .then(|| StatusCode::from_u16(code).ok())
            .flatten()
    }

    /// Set the envelope status; codes outside the catalog leave the current status in place
    pub fn with_status(mut self, status: StatusCode) -> Self {
        if STATUS_CATALOG.contains(&status.as_u16()) {
            self.status = status;
        } else {
            warn!(status = status.as_u16(), kept = self.status.as_u16(), "ignoring status outside the envelope catalog");
        }
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl Serialize for FormResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FormResponse", 5)?;
        state.serialize_field("intent", &self.intent)?;
        state.serialize_field("message", &self.message)?;
        state.serialize_field("payload", &self.payload)?;
        state.serialize_field("status", &self.status.as_u16())?;
        state.serialize_field("validation", &self.validation)?;
        state.end()
    }
}

impl IntoResponse for FormResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// What a dispatch returns: an envelope, or a platform response passed through verbatim
#[derive(Debug)]
pub enum Reply {
    Envelope(FormResponse),
    Response(Response),
}

impl Reply {
    pub fn envelope(&self) -> Option<&FormResponse> {
        match self {
            Reply::Envelope(envelope) => Some(envelope),
            Reply::Response(_) => None,
        }
    }

    pub fn into_envelope(self) -> Option<FormResponse> {
        match self {
            Reply::Envelope(envelope) => Some(envelope),
            Reply::Response(_) => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Reply::Envelope(envelope) => envelope.status,
            Reply::Response(response) => response.status(),
        }
    }
}

impl From<FormResponse> for Reply {
    fn from(envelope: FormResponse) -> Self {
        Reply::Envelope(envelope)
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Response(response)
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Envelope(envelope) => envelope.into_response(),
            Reply::Response(response) => response,
        }
    }
}
