//! exiftool adapter: metadata read

use crate::analysis::runner::{CommandRunner, CommandSpec};
use crate::analysis::{require_success, AnalysisOutput, AnalysisResult, AnalysisTarget, Analyzer};
use crate::config::ToolConfig;
use crate::error::AnalysisError;
use futures::future::BoxFuture;
use log::debug;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Tags removed from the report because they expose server-side paths
const SERVER_SIDE_TAGS: &[&str] = &["SourceFile", "Directory", "FilePermissions"];

pub struct ExiftoolAnalyzer {
    runner: Arc<dyn CommandRunner>,
    tool: ToolConfig,
}

impl ExiftoolAnalyzer {
    pub fn new(runner: Arc<dyn CommandRunner>, tool: ToolConfig) -> Self {
        Self { runner, tool }
    }
}

impl Analyzer for ExiftoolAnalyzer {
    type Params = ();

    fn tool(&self) -> &'static str {
        "exiftool"
    }

    fn analyze<'a>(&'a self, target: &'a AnalysisTarget, _params: &'a ()) -> BoxFuture<'a, AnalysisResult> {
        Box::pin(async move {
            let spec = CommandSpec::new(self.tool(), &self.tool.program, self.tool.timeout())
                .arg("-j")
                .arg(target.path.as_os_str());
            let output = self.runner.run(spec).await.map_err(AnalysisError::from)?;
            require_success(self.tool(), &output)?;

            match parse_tags(&output.stdout) {
                Some(tags) => Ok(AnalysisOutput::Metadata(tags)),
                None => {
                    debug!("exiftool output for {} is not JSON, returning raw text", target.key);
                    Ok(AnalysisOutput::Text(output.stdout_lossy()))
                }
            }
        })
    }
}

/// `exiftool -j` prints an array with one object per input file
fn parse_tags(stdout: &[u8]) -> Option<Map<String, Value>> {
    let documents: Vec<Map<String, Value>> = serde_json::from_slice(stdout).ok()?;
    let mut tags = documents.into_iter().next()?;
    for tag in SERVER_SIDE_TAGS {
        tags.remove(*tag);
    }
    Some(tags)
}
