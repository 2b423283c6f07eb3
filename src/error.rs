//! Error taxonomy shared by the orchestrator and the HTTP layer
//!
//! Every failure a request can hit is one of these variants. They render as
//! a flat `{"Error": "<message>"}` body so callers check a single field.

use crate::analysis::runner::ToolError;
use crate::storage::{ArtifactKey, StoreError};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub const NO_FILE_SUBMITTED: &str = "No file submitted.";
pub const NO_FILENAME_SUBMITTED: &str = "No filename submitted.";
pub const FILE_DOES_NOT_EXIST: &str = "File doesn't exist.";
pub const UNKNOWN_FILE_FORMAT: &str = "Unknow file format.";

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Bad or missing field, disallowed extension, empty passphrase
    #[error("{0}")]
    InvalidInput(String),

    /// The referenced artifact is absent
    #[error("File doesn't exist.")]
    NotFound(String),

    /// The artifact could not be decoded as an image
    #[error("Unknow file format.")]
    UnsupportedFormat { key: ArtifactKey, reason: String },

    /// External tool missing, crashed or exited unexpectedly
    #[error("{tool} failed: {detail}")]
    ToolExecutionFailed { tool: String, detail: String },

    /// External tool exceeded its deadline and was killed
    #[error("{tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    /// Extraction ran but produced nothing (wrong passphrase or no payload)
    #[error("{0}")]
    NoPayload(String),

    /// Catch-all for faults nobody classified
    #[error("{0}")]
    Unclassified(String),
}

impl AnalysisError {
    /// Short class name used in logs
    pub fn class(&self) -> &'static str {
        match self {
            AnalysisError::InvalidInput(_) => "InvalidInput",
            AnalysisError::NotFound(_) => "NotFound",
            AnalysisError::UnsupportedFormat { .. } => "UnsupportedFormat",
            AnalysisError::ToolExecutionFailed { .. } => "ToolExecutionFailed",
            AnalysisError::Timeout { .. } => "Timeout",
            AnalysisError::NoPayload(_) => "NoPayload",
            AnalysisError::Unclassified(_) => "Unclassified",
        }
    }

    pub fn tool_failed(tool: &str, detail: impl Into<String>) -> Self {
        AnalysisError::ToolExecutionFailed {
            tool: tool.to_string(),
            detail: detail.into(),
        }
    }
}

impl From<StoreError> for AnalysisError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidKey(key) => AnalysisError::InvalidInput(format!("Invalid filename: {}", key)),
            StoreError::NotFound(key) => AnalysisError::NotFound(key),
            other => AnalysisError::Unclassified(other.to_string()),
        }
    }
}

impl From<ToolError> for AnalysisError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Timeout { tool, timeout } => AnalysisError::Timeout {
                tool,
                seconds: timeout.as_secs(),
            },
            other => AnalysisError::ToolExecutionFailed {
                tool: other.tool().to_string(),
                detail: other.to_string(),
            },
        }
    }
}

/// Flat error body shared by every endpoint
pub fn error_body(message: &str) -> serde_json::Value {
    json!({ "Error": message })
}

impl ResponseError for AnalysisError {
    // Errors travel in the body; the reference clients never look at the status
    fn status_code(&self) -> StatusCode {
        StatusCode::OK
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(error_body(&self.to_string()))
    }
}
