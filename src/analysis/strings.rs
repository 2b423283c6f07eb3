//! strings adapter: printable-run scan over the raw artifact bytes

use crate::analysis::runner::{CommandRunner, CommandSpec};
use crate::analysis::{require_success, AnalysisOutput, AnalysisResult, AnalysisTarget, Analyzer};
use crate::config::ToolConfig;
use crate::error::AnalysisError;
use futures::future::BoxFuture;
use std::sync::Arc;

pub struct StringsAnalyzer {
    runner: Arc<dyn CommandRunner>,
    tool: ToolConfig,
    min_length: usize,
}

impl StringsAnalyzer {
    pub fn new(runner: Arc<dyn CommandRunner>, tool: ToolConfig, min_length: usize) -> Self {
        Self {
            runner,
            tool,
            min_length: min_length.max(1),
        }
    }
}

impl Analyzer for StringsAnalyzer {
    type Params = ();

    fn tool(&self) -> &'static str {
        "strings"
    }

    fn analyze<'a>(&'a self, target: &'a AnalysisTarget, _params: &'a ()) -> BoxFuture<'a, AnalysisResult> {
        Box::pin(async move {
            let spec = CommandSpec::new(self.tool(), &self.tool.program, self.tool.timeout())
                .arg("-n")
                .arg(self.min_length.to_string())
                .arg(target.path.as_os_str());
            let output = self.runner.run(spec).await.map_err(AnalysisError::from)?;
            require_success(self.tool(), &output)?;

            let runs = output
                .stdout_lossy()
                .lines()
                .filter(|line| line.chars().count() >= self.min_length)
                .map(str::to_string)
                .collect();
            Ok(AnalysisOutput::Lines(runs))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::runner::ScriptedRunner;
    use crate::storage::ArtifactKey;
    use std::path::PathBuf;

    fn target() -> AnalysisTarget {
        AnalysisTarget {
            key: ArtifactKey::parse("cat.png").unwrap(),
            path: PathBuf::from("uploads/cat.png"),
        }
    }

    #[tokio::test]
    async fn test_runs_are_returned_in_order() {
        let runner = Arc::new(ScriptedRunner::always("IHDR\nsRGB\nflag{strings}\nIEND\n"));
        let analyzer = StringsAnalyzer::new(runner.clone(), ToolConfig::new("strings", 15), 4);

        let output = analyzer.analyze(&target(), &()).await.unwrap();

        assert_eq!(
            output,
            AnalysisOutput::Lines(vec![
                "IHDR".to_string(),
                "sRGB".to_string(),
                "flag{strings}".to_string(),
                "IEND".to_string()
            ])
        );
        assert_eq!(
            runner.calls()[0].args_lossy(),
            vec!["-n".to_string(), "4".to_string(), "uploads/cat.png".to_string()]
        );
    }

    #[tokio::test]
    async fn test_runs_below_threshold_are_dropped() {
        let runner = Arc::new(ScriptedRunner::always("abcdefgh\nabc\n\n"));
        let analyzer = StringsAnalyzer::new(runner, ToolConfig::new("strings", 15), 6);

        let output = analyzer.analyze(&target(), &()).await.unwrap();
        assert_eq!(output, AnalysisOutput::Lines(vec!["abcdefgh".to_string()]));
    }
}
