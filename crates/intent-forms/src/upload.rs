// File: src/upload.rs
// Purpose: Uploaded file parts and the pluggable upload handler

use crate::error::Thrown;
use crate::form_data::FormValue;
use async_trait::async_trait;
use bytes::Bytes;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::future::Future;

/// A file part received in a multipart submission
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    /// Client-supplied file name
    pub name: String,
    /// Declared content type, `application/octet-stream` when absent
    pub content_type: String,
    pub bytes: Bytes,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// File contents as UTF-8 text, if valid
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

// Serialized as metadata only; contents never go on the wire
impl Serialize for FileUpload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FileUpload", 3)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("type", &self.content_type)?;
        state.serialize_field("size", &self.size())?;
        state.end()
    }
}

/// Pre-processes file parts before they reach the flattened field set
///
/// The returned value replaces the file under the same field name, e.g. a
/// storage URL as text after the file was persisted.
#[async_trait]
pub trait UploadHandler: Send + Sync {
    async fn handle(&self, upload: FileUpload) -> Result<FormValue, Thrown>;
}

#[async_trait]
impl<F, Fut> UploadHandler for F
where
    F: Fn(FileUpload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FormValue, Thrown>> + Send,
{
    async fn handle(&self, upload: FileUpload) -> Result<FormValue, Thrown> {
        (self)(upload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_metadata_json() {
        let file = FileUpload::new("avatar.png", "image/png", vec![0u8; 12]);
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json, serde_json::json!({"name": "avatar.png", "type": "image/png", "size": 12}));
    }

    #[test]
    fn test_text_contents() {
        let file = FileUpload::new("notes.txt", "text/plain", "hello");
        assert_eq!(file.text(), Some("hello"));
        assert_eq!(file.size(), 5);
    }

    #[tokio::test]
    async fn test_closure_upload_handler() {
        let handler = |upload: FileUpload| async move { Ok::<_, Thrown>(FormValue::Text(format!("/files/{}", upload.name))) };
        let stored = handler
            .handle(FileUpload::new("a.txt", "text/plain", "x"))
            .await
            .unwrap();
        assert_eq!(stored, FormValue::Text("/files/a.txt".to_string()));
    }
}
