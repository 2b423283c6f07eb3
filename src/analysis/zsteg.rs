//! zsteg adapter: LSB / embedded-data scan for PNG and BMP

use crate::analysis::runner::{CommandRunner, CommandSpec};
use crate::analysis::{require_success, AnalysisOutput, AnalysisResult, AnalysisTarget, Analyzer};
use crate::config::ToolConfig;
use crate::error::AnalysisError;
use crate::storage::{ArtifactKey, ArtifactKind, ArtifactStore};
use futures::future::BoxFuture;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use std::sync::Arc;

lazy_static! {
    static ref ANSI_ESCAPE: Regex = Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").unwrap();
    static ref PAYLOAD_SPEC: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9,:._-]*$").unwrap();
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZstegParams {
    /// `-a`: try every channel, bit and ordering combination
    pub exhaustive: bool,
    /// Carve every detected embedded file into the store
    pub extract_files: bool,
}

pub struct ZstegAnalyzer {
    runner: Arc<dyn CommandRunner>,
    store: Arc<dyn ArtifactStore>,
    tool: ToolConfig,
}

impl ZstegAnalyzer {
    pub fn new(runner: Arc<dyn CommandRunner>, store: Arc<dyn ArtifactStore>, tool: ToolConfig) -> Self {
        Self { runner, store, tool }
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(self.tool(), &self.tool.program, self.tool.timeout())
    }

    /// Carve each payload the report flags as a file; a failed carve is
    /// logged and skipped so the scan report still comes back
    async fn extract_files(&self, target: &AnalysisTarget, report: &[String]) -> Vec<ArtifactKey> {
        let mut extracted = Vec::new();

        for payload in file_payloads(report) {
            let spec = self
                .command()
                .arg("-E")
                .arg(payload.as_str())
                .arg(target.path.as_os_str());

            let output = match self.runner.run(spec).await {
                Ok(output) if output.success && !output.stdout.is_empty() => output,
                Ok(output) => {
                    warn!("zsteg could not carve {} from {}: {}", payload, target.key, output.diagnostics());
                    continue;
                }
                Err(e) => {
                    warn!("zsteg carve of {} from {} failed: {}", payload, target.key, e);
                    continue;
                }
            };

            let stored = target
                .key
                .derive(&format!("zsteg_{}.bin", payload.replace([',', ':'], "_")))
                .and_then(|key| self.store.put(&key, &output.stdout, ArtifactKind::DerivedExtraction));
            match stored {
                Ok(artifact) => {
                    info!("zsteg carved {} ({} bytes) from {}", artifact.key, artifact.size, target.key);
                    extracted.push(artifact.key);
                }
                Err(e) => warn!("Cannot store zsteg payload {} of {}: {}", payload, target.key, e),
            }
        }

        extracted
    }
}

impl Analyzer for ZstegAnalyzer {
    type Params = ZstegParams;

    fn tool(&self) -> &'static str {
        "zsteg"
    }

    fn analyze<'a>(&'a self, target: &'a AnalysisTarget, params: &'a ZstegParams) -> BoxFuture<'a, AnalysisResult> {
        Box::pin(async move {
            let mut spec = self.command();
            if params.exhaustive {
                spec = spec.arg("-a");
            }
            spec = spec.arg(target.path.as_os_str());

            let output = self.runner.run(spec).await.map_err(AnalysisError::from)?;
            require_success(self.tool(), &output)?;

            let report = clean_report(&output.stdout_lossy());
            let extracted = if params.extract_files {
                self.extract_files(target, &report).await
            } else {
                Vec::new()
            };

            Ok(AnalysisOutput::Scan { report, extracted })
        })
    }
}

/// Strip colour codes and carriage-return progress redraws, drop blank lines
fn clean_report(raw: &str) -> Vec<String> {
    let plain = ANSI_ESCAPE.replace_all(raw, "");
    plain
        .lines()
        .map(|line| line.rsplit('\r').next().unwrap_or(line).trim_end())
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Payload specs (`b1,rgb,lsb,xy`, `extradata:0`, ...) whose description says `file:`
fn file_payloads(report: &[String]) -> Vec<String> {
    let mut payloads: Vec<String> = Vec::new();

    for line in report {
        let Some((spec, description)) = line.split_once("..") else {
            continue;
        };
        let spec = spec.trim();
        if !description.trim_start().starts_with("file:") || !PAYLOAD_SPEC.is_match(spec) {
            continue;
        }
        if !payloads.iter().any(|p| p == spec) {
            payloads.push(spec.to_string());
        }
    }

    payloads
}
