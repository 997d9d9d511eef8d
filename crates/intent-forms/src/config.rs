// File: src/config.rs
// Purpose: Dispatcher configuration parsing from TOML

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormsConfig {
    #[serde(default)]
    pub limits: UploadLimits,

    #[serde(default)]
    pub messages: Messages,

    /// How many file parts are handed to the upload handler at once
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
}

/// Multipart limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadLimits {
    /// Bytes per file part
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Bytes of headers per part
    #[serde(default = "default_max_header_size")]
    pub max_header_size: usize,

    /// Bytes per text part
    #[serde(default = "default_max_field_size")]
    pub max_field_size: usize,

    /// Bytes of a buffered urlencoded or JSON body
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// File parts per request, unlimited when absent
    #[serde(default)]
    pub max_files: Option<usize>,
}

/// Default envelope messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Messages {
    #[serde(default = "default_success")]
    pub success: String,

    #[serde(default = "default_error")]
    pub error: String,

    #[serde(default = "default_not_implemented")]
    pub not_implemented: String,
}

/// Which multipart limit was breached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadLimit {
    FileCount,
    FileSize,
    HeaderSize,
    FieldSize,
    BodySize,
}

impl fmt::Display for UploadLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UploadLimit::FileCount => "file count",
            UploadLimit::FileSize => "file size",
            UploadLimit::HeaderSize => "header size",
            UploadLimit::FieldSize => "field size",
            UploadLimit::BodySize => "body size",
        })
    }
}

// Default values
fn default_upload_concurrency() -> usize {
    4
}

fn default_max_file_size() -> usize {
    2 * 1024 * 1024
}

fn default_max_header_size() -> usize {
    8 * 1024
}

fn default_max_field_size() -> usize {
    1024 * 1024
}

fn default_max_body_size() -> usize {
    2 * 1024 * 1024
}

fn default_success() -> String {
    "Success".to_string()
}

fn default_error() -> String {
    "Error".to_string()
}

fn default_not_implemented() -> String {
    "Not Implemented".to_string()
}

impl Default for FormsConfig {
    fn default() -> Self {
        Self {
            limits: UploadLimits::default(),
            messages: Messages::default(),
            upload_concurrency: default_upload_concurrency(),
        }
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_header_size: default_max_header_size(),
            max_field_size: default_max_field_size(),
            max_body_size: default_max_body_size(),
            max_files: None,
        }
    }
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            success: default_success(),
            error: default_error(),
            not_implemented: default_not_implemented(),
        }
    }
}

impl UploadLimits {
    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = Some(max_files);
        self
    }

    pub fn with_max_file_size(mut self, bytes: usize) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_max_header_size(mut self, bytes: usize) -> Self {
        self.max_header_size = bytes;
        self
    }

    pub fn with_max_field_size(mut self, bytes: usize) -> Self {
        self.max_field_size = bytes;
        self
    }

    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }
}

impl FormsConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse forms configuration")
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            // Return default config if file doesn't exist
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_messages(mut self, messages: Messages) -> Self {
        self.messages = messages;
        self
    }
}
