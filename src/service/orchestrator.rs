//! Analysis orchestration
//!
//! A request names one artifact and one technique. The orchestrator checks the
//! artifact exists, validates technique parameters, dispatches to exactly one
//! component and folds whatever comes back (including panics) into a single
//! [`Envelope`]. Requests share nothing but the artifact store.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::{
    AnalysisOutput, AnalysisResult, AnalysisTarget, Analyzer, BinwalkAnalyzer, CommandRunner, ExiftoolAnalyzer,
    SteghideAnalyzer, SteghideParams, StringsAnalyzer, ZstegAnalyzer, ZstegParams,
};
use crate::config::{StorageConfig, ToolsConfig};
use crate::decompose::{self, DecodeError};
use crate::error::AnalysisError;
use crate::service::envelope::Envelope;
use crate::service::request_context::RequestContext;
use crate::storage::{ArtifactKey, ArtifactKind, ArtifactStore};

/// Image extensions accepted on upload, compared case-insensitively
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpeg", "png", "bmp", "gif", "tiff", "jpg", "jfif", "jpe", "tif"];

/// One analysis technique and its parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Technique {
    BitPlanes,
    EmbeddedScan(ZstegParams),
    FileCarving,
    PayloadExtraction(SteghideParams),
    Metadata,
    Strings,
}

impl Technique {
    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Technique::BitPlanes => "decompose",
            Technique::EmbeddedScan(_) => "zsteg",
            Technique::FileCarving => "binwalk",
            Technique::PayloadExtraction(_) => "steghide",
            Technique::Metadata => "exiftool",
            Technique::Strings => "strings",
        }
    }

    /// Top-level response field carrying a successful result
    pub fn envelope_field(&self) -> &'static str {
        match self {
            Technique::BitPlanes => "Images",
            Technique::EmbeddedScan(_) => "Zsteg",
            Technique::FileCarving => "Binwalk",
            Technique::PayloadExtraction(_) => "Steghide",
            Technique::Metadata => "Exiftool",
            Technique::Strings => "Strings",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    /// Artifact name exactly as the client sent it
    pub filename: String,
    pub technique: Technique,
}

impl AnalysisRequest {
    pub fn new(filename: impl Into<String>, technique: Technique) -> Self {
        Self {
            filename: filename.into(),
            technique,
        }
    }
}

/// Lifecycle of one request, Received -> Validated -> Dispatched -> Completed.
/// Validation failures jump straight to Completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Validated,
    Dispatched,
    Completed,
}

pub struct Orchestrator {
    store: Arc<dyn ArtifactStore>,
    zsteg: ZstegAnalyzer,
    binwalk: BinwalkAnalyzer,
    steghide: SteghideAnalyzer,
    exiftool: ExiftoolAnalyzer,
    strings: StringsAnalyzer,
    randomize_upload_names: bool,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        runner: Arc<dyn CommandRunner>,
        tools: &ToolsConfig,
        storage: &StorageConfig,
    ) -> Self {
        Self {
            zsteg: ZstegAnalyzer::new(Arc::clone(&runner), Arc::clone(&store), tools.zsteg.clone()),
            binwalk: BinwalkAnalyzer::new(Arc::clone(&runner), tools.binwalk.clone()),
            steghide: SteghideAnalyzer::new(Arc::clone(&runner), Arc::clone(&store), tools.steghide.clone()),
            exiftool: ExiftoolAnalyzer::new(Arc::clone(&runner), tools.exiftool.clone()),
            strings: StringsAnalyzer::new(runner, tools.strings.clone(), tools.strings_min_length),
            randomize_upload_names: storage.randomize_upload_names,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Validate an uploaded file's name and persist it as an original artifact
    pub fn store_upload(&self, filename: &str, data: &[u8]) -> Result<ArtifactKey, AnalysisError> {
        let ext = upload_extension(filename);
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            warn!("Rejected upload {:?}: extension {:?} not allowed", filename, ext);
            return Err(AnalysisError::InvalidInput(format!("Invalid extension: {}", ext)));
        }

        let key = if self.randomize_upload_names {
            ArtifactKey::parse(&format!("{}.{}", Uuid::new_v4().simple(), ext))?
        } else {
            ArtifactKey::parse(filename)?
        };
        if key.is_derived() {
            warn!("Rejected upload {:?}: name is reserved for derived artifacts", filename);
            return Err(AnalysisError::InvalidInput(format!("Invalid filename: {}", filename)));
        }

        let artifact = self.store.put(&key, data, ArtifactKind::Original)?;
        info!("Stored upload {} ({} bytes)", artifact.key, artifact.size);
        Ok(artifact.key)
    }

    /// Run one request to completion. Never fails: every outcome, including a
    /// panic inside a component, ends up in the returned envelope.
    pub async fn process(&self, request: AnalysisRequest) -> Envelope {
        let context = RequestContext::new(&request.filename, request.technique.name());
        let field = request.technique.envelope_field();

        let outcome = context
            .instrument(AssertUnwindSafe(self.execute(request, &context)).catch_unwind())
            .await;

        context.scope(|| {
            let outcome = outcome.unwrap_or_else(|panic| {
                warn!("Analysis panicked: {}", panic_message(panic.as_ref()));
                Err(AnalysisError::Unclassified(panic_message(panic.as_ref())))
            });

            let envelope = match outcome {
                Ok(payload) => Envelope::Success { field, payload },
                Err(err) => {
                    self.cleanup_after(&err);
                    warn!("{} on {}: {}", err.class(), context.artifact, err);
                    Envelope::error(&err)
                }
            };
            transition(RequestState::Completed);
            envelope
        })
    }

    async fn execute(&self, request: AnalysisRequest, context: &RequestContext) -> AnalysisResult {
        transition(RequestState::Received);
        let target = self.resolve(&request.filename)?;
        if let Technique::PayloadExtraction(params) = &request.technique {
            params.validate()?;
        }
        transition(RequestState::Validated);

        transition(RequestState::Dispatched);
        match &request.technique {
            Technique::BitPlanes => self.decompose(target.key, context).await,
            Technique::EmbeddedScan(params) => self.zsteg.analyze(&target, params).await,
            Technique::FileCarving => self.binwalk.analyze(&target, &()).await,
            Technique::PayloadExtraction(params) => self.steghide.analyze(&target, params).await,
            Technique::Metadata => self.exiftool.analyze(&target, &()).await,
            Technique::Strings => self.strings.analyze(&target, &()).await,
        }
    }

    /// Names that cannot be keys cannot exist in the store either
    fn resolve(&self, filename: &str) -> Result<AnalysisTarget, AnalysisError> {
        let key = ArtifactKey::parse(filename).map_err(|_| AnalysisError::NotFound(filename.to_string()))?;
        let path = self.store.locate(&key)?;
        Ok(AnalysisTarget { key, path })
    }

    async fn decompose(&self, key: ArtifactKey, context: &RequestContext) -> AnalysisResult {
        let store = Arc::clone(&self.store);
        let context = context.clone();
        tokio::task::spawn_blocking(move || context.scope(|| decompose_into_store(store.as_ref(), &key)))
            .await
            .unwrap_or_else(|e| {
                if e.is_panic() {
                    Err(AnalysisError::Unclassified(panic_message(e.into_panic().as_ref())))
                } else {
                    Err(AnalysisError::Unclassified("bit-plane decomposition was cancelled".to_string()))
                }
            })
    }

    /// An upload that turned out not to be an image is removed
    fn cleanup_after(&self, err: &AnalysisError) {
        if let AnalysisError::UnsupportedFormat { key, reason } = err {
            info!("Deleting {} after failed decode: {}", key, reason);
            if let Err(e) = self.store.delete(key) {
                warn!("Failed to delete undecodable upload {}: {}", key, e);
            }
        }
    }
}

fn transition(state: RequestState) {
    debug!("request state -> {:?}", state);
}

/// Planes are built, encoded and stored one at a time; only the decoded
/// samples and a single plane are in memory at once.
fn decompose_into_store(store: &dyn ArtifactStore, key: &ArtifactKey) -> AnalysisResult {
    let data = store.get(key)?;
    let image = decompose::decode(&data).map_err(|e| match e {
        DecodeError::UnsupportedFormat(reason) => AnalysisError::UnsupportedFormat {
            key: key.clone(),
            reason,
        },
        other => AnalysisError::Unclassified(other.to_string()),
    })?;
    drop(data);

    let mut keys = Vec::with_capacity(image.plane_count());
    for plane in image.planes() {
        let plane_key = key.derive(&plane.file_suffix())?;
        let png = plane
            .encode_png()
            .map_err(|e| AnalysisError::Unclassified(e.to_string()))?;
        store.put(&plane_key, &png, ArtifactKind::DerivedBitPlane)?;
        keys.push(plane_key);
    }
    info!("Decomposed {} into {} bit-planes", key, keys.len());
    Ok(AnalysisOutput::Images(keys))
}

/// Lower-cased text after the last dot, empty when there is none
fn upload_extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unexpected internal fault".to_string()
    }
}
