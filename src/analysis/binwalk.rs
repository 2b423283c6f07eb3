//! binwalk adapter: file-signature carving scan

use crate::analysis::runner::{CommandRunner, CommandSpec};
use crate::analysis::{require_success, AnalysisOutput, AnalysisResult, AnalysisTarget, Analyzer};
use crate::config::ToolConfig;
use crate::error::AnalysisError;
use futures::future::BoxFuture;
use std::sync::Arc;

pub struct BinwalkAnalyzer {
    runner: Arc<dyn CommandRunner>,
    tool: ToolConfig,
}

impl BinwalkAnalyzer {
    pub fn new(runner: Arc<dyn CommandRunner>, tool: ToolConfig) -> Self {
        Self { runner, tool }
    }
}

impl Analyzer for BinwalkAnalyzer {
    type Params = ();

    fn tool(&self) -> &'static str {
        "binwalk"
    }

    fn analyze<'a>(&'a self, target: &'a AnalysisTarget, _params: &'a ()) -> BoxFuture<'a, AnalysisResult> {
        Box::pin(async move {
            let spec = CommandSpec::new(self.tool(), &self.tool.program, self.tool.timeout()).arg(target.path.as_os_str());
            let output = self.runner.run(spec).await.map_err(AnalysisError::from)?;
            require_success(self.tool(), &output)?;

            Ok(AnalysisOutput::Text(output.stdout_lossy()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::runner::{CommandOutput, ScriptedRunner, ToolError};
    use crate::storage::ArtifactKey;
    use std::path::PathBuf;

    const REPORT: &str = "\nDECIMAL       HEXADECIMAL     DESCRIPTION\n\
--------------------------------------------------------------------------------\n\
0             0x0             PNG image, 64 x 64, 8-bit/color RGBA, non-interlaced\n\
4821          0x12D5          Zip archive data, name: flag.txt\n";

    fn target() -> AnalysisTarget {
        AnalysisTarget {
            key: ArtifactKey::parse("cat.png").unwrap(),
            path: PathBuf::from("uploads/cat.png"),
        }
    }

    #[tokio::test]
    async fn test_report_is_returned_verbatim() {
        let runner = Arc::new(ScriptedRunner::always(REPORT));
        let analyzer = BinwalkAnalyzer::new(runner.clone(), ToolConfig::new("binwalk", 30));

        let output = analyzer.analyze(&target(), &()).await.unwrap();

        assert_eq!(output, AnalysisOutput::Text(REPORT.to_string()));
        assert_eq!(runner.calls()[0].program, "binwalk");
        assert_eq!(runner.calls()[0].args_lossy(), vec!["uploads/cat.png".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_failure() {
        let runner = Arc::new(ScriptedRunner::new(|spec| {
            Err(ToolError::Spawn {
                tool: spec.tool.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }));
        let analyzer = BinwalkAnalyzer::new(runner, ToolConfig::new("binwalk", 30));

        let err = analyzer.analyze(&target(), &()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::ToolExecutionFailed { ref tool, .. } if tool == "binwalk"));
    }

    #[tokio::test]
    async fn test_crash_reports_output_tail() {
        let runner = Arc::new(ScriptedRunner::new(|_| Ok(CommandOutput::failed(1, "Traceback: ModuleNotFoundError"))));
        let analyzer = BinwalkAnalyzer::new(runner, ToolConfig::new("binwalk", 30));

        let err = analyzer.analyze(&target(), &()).await.unwrap_err();
        assert!(err.to_string().contains("ModuleNotFoundError"));
    }
}
