//! External analyzer adapters
//!
//! Each forensic tool sits behind the same [`Analyzer`] shape: it receives the
//! on-disk location of an artifact plus tool-specific parameters and resolves
//! to an [`AnalysisResult`]. Output parsing stays inside each adapter so one
//! tool's quirks never leak into another's contract.

pub mod binwalk;
pub mod exiftool;
pub mod runner;
pub mod steghide;
pub mod strings;
pub mod zsteg;

use crate::error::AnalysisError;
use crate::storage::ArtifactKey;
use futures::future::BoxFuture;
use serde::Serialize;
use std::path::PathBuf;

pub use binwalk::BinwalkAnalyzer;
pub use exiftool::ExiftoolAnalyzer;
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner, ToolError};
#[cfg(test)]
pub use runner::ScriptedRunner;
pub use steghide::{SteghideAnalyzer, SteghideParams};
pub use strings::StringsAnalyzer;
pub use zsteg::{ZstegAnalyzer, ZstegParams};

/// Artifact an analyzer works on: its key (for naming derived output) and
/// the file the tool reads
#[derive(Debug, Clone)]
pub struct AnalysisTarget {
    pub key: ArtifactKey,
    pub path: PathBuf,
}

/// Successful payload of one technique
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisOutput {
    /// Keys of derived artifacts, in production order
    Images(Vec<ArtifactKey>),
    /// Unstructured tool report
    Text(String),
    /// Line-oriented results
    Lines(Vec<String>),
    /// Structured key/value metadata
    Metadata(serde_json::Map<String, serde_json::Value>),
    /// Embedded-data scan report and the artifacts it carved out
    Scan {
        report: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        extracted: Vec<ArtifactKey>,
    },
    /// Extracted secret, stored as an artifact and previewed as text
    Payload { file: ArtifactKey, content: String },
}

pub type AnalysisResult = Result<AnalysisOutput, AnalysisError>;

/// One external analysis technique
pub trait Analyzer: Send + Sync {
    type Params: Send + Sync;

    /// Tool name used in logs and error messages
    fn tool(&self) -> &'static str;

    fn analyze<'a>(&'a self, target: &'a AnalysisTarget, params: &'a Self::Params) -> BoxFuture<'a, AnalysisResult>;
}

/// Shared handling of a finished tool run: non-zero exit becomes
/// `ToolExecutionFailed` carrying the output tail
pub(crate) fn require_success(tool: &str, output: &CommandOutput) -> Result<(), AnalysisError> {
    if output.success {
        Ok(())
    } else {
        Err(AnalysisError::tool_failed(tool, output.diagnostics()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_serialization_shapes() {
        let key = ArtifactKey::parse("cat.png~Red_7.png").unwrap();
        assert_eq!(
            serde_json::to_value(AnalysisOutput::Images(vec![key.clone()])).unwrap(),
            json!(["cat.png~Red_7.png"])
        );
        assert_eq!(
            serde_json::to_value(AnalysisOutput::Text("report".into())).unwrap(),
            json!("report")
        );
        assert_eq!(
            serde_json::to_value(AnalysisOutput::Scan {
                report: vec!["line".into()],
                extracted: vec![]
            })
            .unwrap(),
            json!({ "report": ["line"] })
        );
        assert_eq!(
            serde_json::to_value(AnalysisOutput::Payload {
                file: key,
                content: "secret".into()
            })
            .unwrap(),
            json!({ "file": "cat.png~Red_7.png", "content": "secret" })
        );
    }

    #[test]
    fn test_require_success() {
        assert!(require_success("binwalk", &CommandOutput::ok("fine")).is_ok());
        let err = require_success("binwalk", &CommandOutput::failed(2, "boom")).unwrap_err();
        assert_eq!(err.to_string(), "binwalk failed: exit status 2: boom");
    }
}
