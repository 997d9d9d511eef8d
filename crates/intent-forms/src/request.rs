// File: src/request.rs
// Purpose: Request abstraction consumed by the dispatcher

use crate::form_data::FormData;
use axum::async_trait;
use axum::body::Body;
use axum::extract::{FromRequest, Request};
use axum::http::{header, HeaderMap, HeaderValue, Method, Uri};
use bytes::Bytes;
use std::convert::Infallible;

/// Submitted body
#[derive(Debug)]
pub enum RequestBody {
    /// Already-decoded flattened fields
    Fields(FormData),
    /// Raw bytes, decoded by content type
    Bytes(Bytes),
    /// Streaming body, multipart bodies are parsed without buffering
    Stream(Body),
}

/// A submission to dispatch
#[derive(Debug)]
pub struct FormRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl FormRequest {
    /// A POST to `uri` with pre-decoded fields
    pub fn post(uri: Uri, fields: FormData) -> Self {
        Self {
            method: Method::POST,
            uri,
            headers: HeaderMap::new(),
            body: RequestBody::Fields(fields),
        }
    }

    /// A POST to `uri` with a raw body of the given content type
    pub fn with_body(uri: Uri, content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }

        Self {
            method: Method::POST,
            uri,
            headers,
            body: RequestBody::Bytes(body.into()),
        }
    }

    /// Wrap an axum request, keeping its body as a stream
    pub fn from_axum(request: Request) -> Self {
        let (parts, body) = request.into_parts();

        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body: RequestBody::Stream(body),
        }
    }

    /// Get a header value
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_header(header::CONTENT_TYPE.as_str())
    }

    pub fn is_multipart(&self) -> bool {
        is_multipart(&self.headers)
    }
}

/// Whether the content type declares `multipart/form-data`
pub fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

#[async_trait]
impl<S> FromRequest<S> for FormRequest
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(request: Request, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_axum(request))
    }
}
