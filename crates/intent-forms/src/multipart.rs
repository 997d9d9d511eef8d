// File: src/multipart.rs
// Purpose: Decode request bodies into flattened form data

use crate::config::{UploadLimit, UploadLimits};
use crate::error::FormError;
use crate::form_data::FormData;
use crate::request::{is_multipart, RequestBody};
use crate::upload::FileUpload;
use axum::http::{header, HeaderMap};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value as JsonValue;
use tracing::debug;

/// Decodes a request body into flattened form data
///
/// Multipart bodies are stream-parsed with `limits` enforced; any other body
/// is buffered and decoded as JSON or `application/x-www-form-urlencoded`
/// according to its content type.
pub async fn read_body(headers: &HeaderMap, body: RequestBody, limits: &UploadLimits) -> Result<FormData, FormError> {
    match body {
        RequestBody::Fields(fields) => Ok(fields),

        body if is_multipart(headers) => {
            let boundary = boundary(headers)?;

            match body {
                RequestBody::Bytes(bytes) if bytes.is_empty() => {
                    Err(FormError::MalformedRequest("request body is empty".to_string()))
                }
                RequestBody::Bytes(bytes) => {
                    let stream = stream::once(async move { Ok::<_, std::io::Error>(bytes) });
                    parse_multipart(stream, boundary, limits).await
                }
                RequestBody::Stream(body) => parse_multipart(body.into_data_stream(), boundary, limits).await,
                RequestBody::Fields(fields) => Ok(fields),
            }
        }

        RequestBody::Bytes(bytes) => {
            if bytes.len() > limits.max_body_size {
                return Err(body_limit(limits));
            }
            decode_flat(headers, &bytes)
        }

        RequestBody::Stream(body) => {
            let mut data = body.into_data_stream();
            let mut bytes = BytesMut::new();
            while let Some(chunk) = data.next().await {
                let chunk = chunk.map_err(FormError::Body)?;
                if bytes.len() + chunk.len() > limits.max_body_size {
                    return Err(body_limit(limits));
                }
                bytes.extend_from_slice(&chunk);
            }
            decode_flat(headers, &bytes.freeze())
        }
    }
}

fn body_limit(limits: &UploadLimits) -> FormError {
    FormError::UploadLimitExceeded {
        limit: UploadLimit::BodySize,
        max: limits.max_body_size,
    }
}

/// Truncated or unparseable multipart input is the client's fault
fn multipart_error(err: multer::Error) -> FormError {
    match err {
        multer::Error::IncompleteStream
        | multer::Error::IncompleteHeaders
        | multer::Error::IncompleteFieldData { .. }
        | multer::Error::ReadHeaderFailed(_)
        | multer::Error::DecodeHeaderName { .. }
        | multer::Error::DecodeHeaderValue { .. }
        | multer::Error::DecodeContentType(_) => FormError::MalformedRequest(err.to_string()),
        err => FormError::Multipart(err),
    }
}

fn boundary(headers: &HeaderMap) -> Result<String, FormError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    multer::parse_boundary(content_type)
        .map_err(|_| FormError::MalformedRequest("invalid Content-Type header: missing boundary".to_string()))
}

fn decode_flat(headers: &HeaderMap, bytes: &Bytes) -> Result<FormData, FormError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if content_type.contains("application/json") {
        if bytes.is_empty() {
            return Ok(FormData::new());
        }
        let json: JsonValue = serde_json::from_slice(bytes)
            .map_err(|e| FormError::MalformedRequest(format!("invalid JSON body: {}", e)))?;
        return Ok(FormData::from_json(&json));
    }

    let text = std::str::from_utf8(bytes)
        .map_err(|_| FormError::MalformedRequest("form body is not valid UTF-8".to_string()))?;

    Ok(FormData::from_urlencoded(text))
}

/// Stream-parses a multipart body
///
/// Text parts become text entries, file parts become file entries, both in
/// part order. Unnamed parts are skipped.
pub async fn parse_multipart<S, O, E>(stream: S, boundary: String, limits: &UploadLimits) -> Result<FormData, FormError>
where
    S: Stream<Item = Result<O, E>> + Send + 'static,
    O: Into<Bytes> + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut form_data = FormData::new();
    let mut files = 0usize;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let header_size: usize = field
            .headers()
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len() + 4)
            .sum();

        if header_size > limits.max_header_size {
            return Err(FormError::UploadLimitExceeded {
                limit: UploadLimit::HeaderSize,
                max: limits.max_header_size,
            });
        }

        let Some(name) = field.name().map(str::to_string) else {
            debug!("skipping unnamed multipart part");
            continue;
        };

        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                files += 1;
                if let Some(max) = limits.max_files.filter(|max| files > *max) {
                    return Err(FormError::UploadLimitExceeded {
                        limit: UploadLimit::FileCount,
                        max,
                    });
                }

                let content_type = field
                    .content_type()
                    .map(|mime| mime.to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());

                let mut contents = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    if contents.len() + chunk.len() > limits.max_file_size {
                        return Err(FormError::UploadLimitExceeded {
                            limit: UploadLimit::FileSize,
                            max: limits.max_file_size,
                        });
                    }
                    contents.extend_from_slice(&chunk);
                }

                debug!(field = %name, file = %file_name, size = contents.len(), "received file part");
                form_data.append_file(name, FileUpload::new(file_name, content_type, contents.freeze()));
            }
            None => {
                let mut contents = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    if contents.len() + chunk.len() > limits.max_field_size {
                        return Err(FormError::UploadLimitExceeded {
                            limit: UploadLimit::FieldSize,
                            max: limits.max_field_size,
                        });
                    }
                    contents.extend_from_slice(&chunk);
                }
                form_data.append(name, String::from_utf8_lossy(&contents).into_owned());
            }
        }
    }

    Ok(form_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form_data::FormValue;

    const BOUNDARY: &str = "X-BOUNDARY";

    fn multipart_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY).parse().unwrap(),
        );
        headers
    }

    fn body(parts: &[(&str, Option<&str>, &str)]) -> Bytes {
        let mut out = String::new();
        for (name, file_name, contents) in parts {
            out.push_str(&format!("--{}\r\n", BOUNDARY));
            match file_name {
                Some(file_name) => out.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/plain\r\n\r\n",
                    name, file_name
                )),
                None => out.push_str(&format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)),
            }
            out.push_str(contents);
            out.push_str("\r\n");
        }
        out.push_str(&format!("--{}--\r\n", BOUNDARY));
        Bytes::from(out)
    }

    #[tokio::test]
    async fn test_text_and_file_parts_in_order() {
        let bytes = body(&[
            ("tags[]", None, "a"),
            ("doc", Some("notes.txt"), "hello"),
            ("tags[]", None, "b"),
        ]);

        let form = read_body(&multipart_headers(), RequestBody::Bytes(bytes), &UploadLimits::default())
            .await
            .unwrap();

        let keys: Vec<&str> = form.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["tags[]", "doc", "tags[]"]);

        let file = form.get("doc").and_then(FormValue::as_file).unwrap();
        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.content_type, "text/plain");
        assert_eq!(file.text(), Some("hello"));
    }

    #[tokio::test]
    async fn test_file_count_limit() {
        let bytes = body(&[("a", Some("1.txt"), "1"), ("b", Some("2.txt"), "2")]);
        let limits = UploadLimits::default().with_max_files(1);

        let err = read_body(&multipart_headers(), RequestBody::Bytes(bytes), &limits)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FormError::UploadLimitExceeded { limit: UploadLimit::FileCount, max: 1 }
        ));
    }

    #[tokio::test]
    async fn test_file_size_limit() {
        let bytes = body(&[("a", Some("big.txt"), "0123456789")]);
        let limits = UploadLimits::default().with_max_file_size(4);

        let err = read_body(&multipart_headers(), RequestBody::Bytes(bytes), &limits)
            .await
            .unwrap_err();

        assert!(matches!(err, FormError::UploadLimitExceeded { limit: UploadLimit::FileSize, .. }));
    }

    #[tokio::test]
    async fn test_header_size_limit() {
        let bytes = body(&[("name", None, "Ada")]);
        let limits = UploadLimits::default().with_max_header_size(10);

        let err = read_body(&multipart_headers(), RequestBody::Bytes(bytes), &limits)
            .await
            .unwrap_err();

        assert!(matches!(err, FormError::UploadLimitExceeded { limit: UploadLimit::HeaderSize, .. }));
    }

    #[tokio::test]
    async fn test_missing_boundary() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "multipart/form-data".parse().unwrap());

        let err = read_body(&headers, RequestBody::Bytes(Bytes::from_static(b"x")), &UploadLimits::default())
            .await
            .unwrap_err();

        assert!(matches!(err, FormError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_empty_multipart_body() {
        let err = read_body(&multipart_headers(), RequestBody::Bytes(Bytes::new()), &UploadLimits::default())
            .await
            .unwrap_err();

        assert!(matches!(err, FormError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_empty_multipart_stream() {
        let err = read_body(
            &multipart_headers(),
            RequestBody::Stream(axum::body::Body::empty()),
            &UploadLimits::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FormError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_truncated_multipart_stream() {
        let truncated = format!("--{}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\nAd", BOUNDARY);

        let err = read_body(
            &multipart_headers(),
            RequestBody::Stream(axum::body::Body::from(truncated)),
            &UploadLimits::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FormError::MalformedRequest(_)));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_text_field_size_limit() {
        let bytes = body(&[("bio", None, "0123456789")]);
        let limits = UploadLimits::default().with_max_field_size(4);

        let err = read_body(&multipart_headers(), RequestBody::Bytes(bytes), &limits)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FormError::UploadLimitExceeded { limit: UploadLimit::FieldSize, max: 4 }
        ));
    }

    #[tokio::test]
    async fn test_text_field_within_limit() {
        let bytes = body(&[("bio", None, "0123")]);
        let limits = UploadLimits::default().with_max_field_size(4);

        let form = read_body(&multipart_headers(), RequestBody::Bytes(bytes), &limits)
            .await
            .unwrap();

        assert_eq!(form.get_text("bio"), Some("0123"));
    }

    #[tokio::test]
    async fn test_flat_body_size_limit() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/x-www-form-urlencoded".parse().unwrap());
        let limits = UploadLimits::default().with_max_body_size(8);

        let err = read_body(
            &headers,
            RequestBody::Stream(axum::body::Body::from("name=Ada+Lovelace")),
            &limits,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            FormError::UploadLimitExceeded { limit: UploadLimit::BodySize, max: 8 }
        ));

        let err = read_body(&headers, RequestBody::Bytes(Bytes::from_static(b"name=Ada+Lovelace")), &limits)
            .await
            .unwrap_err();
        assert!(matches!(err, FormError::UploadLimitExceeded { limit: UploadLimit::BodySize, .. }));

        let form = read_body(&headers, RequestBody::Stream(axum::body::Body::from("a=1")), &limits)
            .await
            .unwrap();
        assert_eq!(form.get_text("a"), Some("1"));
    }

    #[tokio::test]
    async fn test_urlencoded_and_json_bodies() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/x-www-form-urlencoded".parse().unwrap());
        let form = read_body(&headers, RequestBody::Bytes(Bytes::from_static(b"a=1&b=two+words")), &UploadLimits::default())
            .await
            .unwrap();
        assert_eq!(form.get_text("b"), Some("two words"));

        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let form = read_body(
            &headers,
            RequestBody::Stream(axum::body::Body::from(r#"{"user":{"name":"Ada"},"tags":["x"]}"#)),
            &UploadLimits::default(),
        )
        .await
        .unwrap();
        assert_eq!(form.get_text("user.name"), Some("Ada"));
        assert_eq!(form.get_text("tags[0]"), Some("x"));
    }
}
