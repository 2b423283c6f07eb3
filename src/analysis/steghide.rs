//! steghide adapter: passphrase-protected payload extraction

use crate::analysis::runner::{CommandRunner, CommandSpec};
use crate::analysis::{AnalysisOutput, AnalysisResult, AnalysisTarget, Analyzer};
use crate::config::ToolConfig;
use crate::error::AnalysisError;
use crate::storage::{ArtifactKind, ArtifactStore};
use futures::future::BoxFuture;
use log::{info, warn};
use std::sync::Arc;

pub const PASSWORD_REQUIRED: &str = "Steghide doesn't work without password.";
pub const NO_PAYLOAD: &str = "Steghide could not extract any data with that passphrase.";

/// Marker steghide prints on a wrong passphrase or a carrier without payload
const NO_PAYLOAD_MARKER: &str = "could not extract any data";

/// Longest payload preview returned inline
const PREVIEW_CHARS: usize = 4096;

#[derive(Debug, Clone, PartialEq)]
pub struct SteghideParams {
    pub passphrase: String,
}

impl SteghideParams {
    /// Empty passphrases never reach the tool
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.passphrase.is_empty() {
            Err(AnalysisError::InvalidInput(PASSWORD_REQUIRED.to_string()))
        } else {
            Ok(())
        }
    }
}

pub struct SteghideAnalyzer {
    runner: Arc<dyn CommandRunner>,
    store: Arc<dyn ArtifactStore>,
    tool: ToolConfig,
}

impl SteghideAnalyzer {
    pub fn new(runner: Arc<dyn CommandRunner>, store: Arc<dyn ArtifactStore>, tool: ToolConfig) -> Self {
        Self { runner, store, tool }
    }
}

impl Analyzer for SteghideAnalyzer {
    type Params = SteghideParams;

    fn tool(&self) -> &'static str {
        "steghide"
    }

    fn analyze<'a>(&'a self, target: &'a AnalysisTarget, params: &'a SteghideParams) -> BoxFuture<'a, AnalysisResult> {
        Box::pin(async move {
            params.validate()?;

            let scratch = tempfile::tempdir()
                .map_err(|e| AnalysisError::Unclassified(format!("cannot create scratch directory: {}", e)))?;
            let extracted_path = scratch.path().join("payload");

            let spec = CommandSpec::new(self.tool(), &self.tool.program, self.tool.timeout())
                .arg("extract")
                .arg("-sf")
                .arg(target.path.as_os_str())
                .arg("-xf")
                .arg(extracted_path.as_os_str())
                .arg("-p")
                .arg(params.passphrase.as_str())
                .arg("-f");
            let output = self.runner.run(spec).await.map_err(AnalysisError::from)?;

            if !output.success {
                let stderr = output.stderr_lossy();
                if stderr.contains(NO_PAYLOAD_MARKER) {
                    info!("steghide found no payload in {} with the given passphrase", target.key);
                    return Err(AnalysisError::NoPayload(NO_PAYLOAD.to_string()));
                }
                return Err(AnalysisError::tool_failed(self.tool(), output.diagnostics()));
            }

            let payload = match tokio::fs::read(&extracted_path).await {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("steghide reported success on {} but wrote nothing: {}", target.key, e);
                    return Err(AnalysisError::NoPayload(NO_PAYLOAD.to_string()));
                }
            };

            let key = target.key.derive("steghide.bin")?;
            let artifact = self.store.put(&key, &payload, ArtifactKind::DerivedExtraction)?;
            info!("steghide extracted {} bytes from {} into {}", artifact.size, target.key, artifact.key);

            Ok(AnalysisOutput::Payload {
                file: artifact.key,
                content: String::from_utf8_lossy(&payload).chars().take(PREVIEW_CHARS).collect(),
            })
        })
    }
}
