//service/mod.rs
pub mod envelope;
pub mod orchestrator;
pub mod request_context;

use std::collections::HashMap;
use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::error::ErrorInternalServerError;
use actix_web::{web, Error, HttpResponse};
use bytes::BytesMut;
use futures::StreamExt;
use log::{debug, error, info, warn};

use crate::analysis::{SteghideParams, ZstegParams};
use crate::app_state::AppState;
use crate::error::{error_body, AnalysisError, FILE_DOES_NOT_EXIST, NO_FILENAME_SUBMITTED, NO_FILE_SUBMITTED};
use crate::service::envelope::Envelope;
use crate::service::orchestrator::{AnalysisRequest, Technique};
use crate::storage::{ArtifactKey, StoreError};

/// Multipart field carrying the uploaded image
pub const UPLOAD_FIELD: &str = "fileup";

/// Url-encoded form posted to every processing endpoint
pub type AnalysisForm = HashMap<String, String>;

/// Accept one image upload and store it under its key
pub async fn upload_service(mut payload: Multipart, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let limit = app_state.config.server.max_payload_size;
    let Some((filename, bytes)) = read_upload_field(&mut payload, limit).await? else {
        warn!("Upload request without a {} field", UPLOAD_FIELD);
        return Err(AnalysisError::InvalidInput(NO_FILE_SUBMITTED.to_string()).into());
    };
    debug!("Received upload {:?} ({} bytes)", filename, bytes.len());

    let orchestrator = Arc::clone(&app_state.orchestrator);
    let key = web::block(move || orchestrator.store_upload(&filename, &bytes))
        .await
        .map_err(ErrorInternalServerError)??;

    Ok(Envelope::File(key).into_response())
}

/// Pull the file field out of the multipart stream, enforcing the size ceiling
async fn read_upload_field(payload: &mut Multipart, limit: u64) -> Result<Option<(String, BytesMut)>, AnalysisError> {
    while let Some(item) = payload.next().await {
        let mut field = match item {
            Ok(field) => field,
            Err(e) => {
                // Not multipart at all, or a broken boundary before any file
                warn!("Unreadable multipart body: {}", e);
                return Ok(None);
            }
        };

        if field.name() != Some(UPLOAD_FIELD) {
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| AnalysisError::InvalidInput(format!("Malformed upload: {}", e)))?;
            }
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or_default()
            .to_string();

        let mut bytes = BytesMut::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AnalysisError::InvalidInput(format!("Malformed upload: {}", e)))?;
            if (bytes.len() + chunk.len()) as u64 > limit {
                warn!("Upload {:?} exceeds the {} byte ceiling", filename, limit);
                return Err(AnalysisError::InvalidInput(format!("File too large, limit is {} bytes.", limit)));
            }
            bytes.extend_from_slice(&chunk);
        }
        return Ok(Some((filename, bytes)));
    }
    Ok(None)
}

/// Shared body of every processing endpoint: require `filename`, build the
/// technique from the form and hand the request to the orchestrator
pub async fn analysis_service<F>(form: AnalysisForm, app_state: web::Data<AppState>, technique: F) -> Result<HttpResponse, Error>
where
    F: FnOnce(&AnalysisForm) -> Result<Technique, AnalysisError>,
{
    let filename = form
        .get("filename")
        .ok_or_else(|| AnalysisError::InvalidInput(NO_FILENAME_SUBMITTED.to_string()))?;
    let technique = technique(&form)?;
    info!("{} requested on {}", technique.name(), filename);

    let envelope = app_state
        .orchestrator
        .process(AnalysisRequest::new(filename.as_str(), technique))
        .await;
    Ok(envelope.into_response())
}

/// `allzsteg` and `zstegfiles` are integer switches, absent means off
pub fn zsteg_technique(form: &AnalysisForm) -> Result<Technique, AnalysisError> {
    Ok(Technique::EmbeddedScan(ZstegParams {
        exhaustive: form_flag(form, "allzsteg")?,
        extract_files: form_flag(form, "zstegfiles")?,
    }))
}

/// Missing passphrase is treated as empty and rejected by validation
pub fn steghide_technique(form: &AnalysisForm) -> Result<Technique, AnalysisError> {
    Ok(Technique::PayloadExtraction(SteghideParams {
        passphrase: form.get("passwdsteghide").cloned().unwrap_or_default(),
    }))
}

fn form_flag(form: &AnalysisForm, name: &str) -> Result<bool, AnalysisError> {
    match form.get(name) {
        None => Ok(false),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map(|value| value != 0)
            .map_err(|_| AnalysisError::InvalidInput(format!("Invalid value for {}: {:?}", name, raw))),
    }
}

/// Serve a stored artifact. Every call sweeps expired artifacts first.
pub async fn serve_artifact_service(key: String, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let store = Arc::clone(&app_state.store);
    let ttl = app_state.config.storage.ttl();
    let requested = key.clone();

    let result = web::block(move || match ArtifactKey::parse(&requested) {
        Ok(key) => store.read_fresh(&key, ttl).map(|data| (key, data)),
        Err(e) => {
            store.sweep_expired(ttl);
            Err(e)
        }
    })
    .await
    .map_err(ErrorInternalServerError)?;

    match result {
        Ok((key, data)) => {
            debug!("Serving {} ({} bytes)", key, data.len());
            Ok(HttpResponse::Ok().content_type(content_type_for(&key)).body(data))
        }
        Err(StoreError::NotFound(_)) | Err(StoreError::InvalidKey(_)) => {
            debug!("Requested artifact {:?} is not in the store", key);
            Ok(HttpResponse::NotFound().json(error_body(FILE_DOES_NOT_EXIST)))
        }
        Err(e) => {
            error!("Failed to read artifact {:?}: {}", key, e);
            Err(ErrorInternalServerError(e))
        }
    }
}

pub fn content_type_for(key: &ArtifactKey) -> &'static str {
    match key.extension().as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") | Some("jpe") | Some("jfif") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> AnalysisForm {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_zsteg_flags() {
        let technique = zsteg_technique(&form(&[("allzsteg", "1"), ("zstegfiles", "0")])).unwrap();
        assert_eq!(
            technique,
            Technique::EmbeddedScan(ZstegParams {
                exhaustive: true,
                extract_files: false
            })
        );

        let technique = zsteg_technique(&form(&[])).unwrap();
        assert_eq!(technique, Technique::EmbeddedScan(ZstegParams::default()));

        let err = zsteg_technique(&form(&[("allzsteg", "yes")])).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)));
    }

    #[test]
    fn test_steghide_passphrase_defaults_to_empty() {
        let technique = steghide_technique(&form(&[])).unwrap();
        assert_eq!(
            technique,
            Technique::PayloadExtraction(SteghideParams {
                passphrase: String::new()
            })
        );
    }

    #[test]
    fn test_content_types() {
        let key = |raw: &str| ArtifactKey::parse(raw).unwrap();
        assert_eq!(content_type_for(&key("cat.png~Red_7.png")), "image/png");
        assert_eq!(content_type_for(&key("cat.JFIF")), "image/jpeg");
        assert_eq!(content_type_for(&key("cat.tif")), "image/tiff");
        assert_eq!(content_type_for(&key("cat.jpg~steghide.bin")), "application/octet-stream");
        assert_eq!(content_type_for(&key("noext")), "application/octet-stream");
    }
}
