// File: src/error.rs
// Purpose: Error taxonomy for submission handling

use crate::config::UploadLimit;
use crate::response::{FormResponse, Reply};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use intent_forms_path::MalformedPathError;
use thiserror::Error;

/// Failures that abort a dispatch
#[derive(Debug, Error)]
pub enum FormError {
    #[error(transparent)]
    MalformedPath(#[from] MalformedPathError),

    /// Missing boundary, truncated multipart input or an undecodable flat body
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("upload limit exceeded: {limit} (max {max})")]
    UploadLimitExceeded { limit: UploadLimit, max: usize },

    #[error("multipart stream error: {0}")]
    Multipart(#[from] multer::Error),

    #[error("failed to read request body: {0}")]
    Body(#[source] axum::Error),

    /// A lifecycle hook or upload handler failed with a non-reply error
    #[error("form hook failed: {0:#}")]
    Hook(anyhow::Error),

    /// A handler raised a value that must propagate
    #[error("form handler aborted: {0:#}")]
    Aborted(anyhow::Error),
}

impl FormError {
    pub fn status(&self) -> StatusCode {
        match self {
            FormError::MalformedPath(_) | FormError::MalformedRequest(_) | FormError::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            FormError::UploadLimitExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            FormError::Body(_) | FormError::Hook(_) | FormError::Aborted(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for FormError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// What a hook, handler or upload handler raises instead of returning normally
///
/// `Reply` is control flow and ends the dispatch with that reply. `Error`
/// becomes a 500 envelope at the handler boundary and a [`FormError::Hook`]
/// at hook boundaries. `Abort` always propagates to the caller.
#[derive(Debug)]
pub enum Thrown {
    Reply(Reply),
    Error(anyhow::Error),
    Abort(anyhow::Error),
}

impl Thrown {
    pub fn abort(error: impl Into<anyhow::Error>) -> Self {
        Thrown::Abort(error.into())
    }

    pub fn redirect(uri: &str) -> Self {
        Thrown::Reply(Reply::Response(axum::response::Redirect::to(uri).into_response()))
    }
}

impl From<anyhow::Error> for Thrown {
    fn from(error: anyhow::Error) -> Self {
        Thrown::Error(error)
    }
}

impl From<Reply> for Thrown {
    fn from(reply: Reply) -> Self {
        Thrown::Reply(reply)
    }
}

impl From<FormResponse> for Thrown {
    fn from(response: FormResponse) -> Self {
        Thrown::Reply(Reply::Envelope(response))
    }
}

impl From<Response> for Thrown {
    fn from(response: Response) -> Self {
        Thrown::Reply(Reply::Response(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_message() {
        let err = FormError::UploadLimitExceeded {
            limit: UploadLimit::FileCount,
            max: 2,
        };
        assert_eq!(err.to_string(), "upload limit exceeded: file count (max 2)");
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_path_error_is_bad_request() {
        let err: FormError = intent_forms_path::Path::parse("a[").unwrap_err().into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_anyhow_converts_to_generic_error() {
        let thrown: Thrown = anyhow::anyhow!("boom").into();
        assert!(matches!(thrown, Thrown::Error(_)));
    }
}
