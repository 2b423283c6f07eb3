//! Flat response envelope returned by every endpoint

use crate::analysis::AnalysisOutput;
use crate::error::AnalysisError;
use crate::storage::ArtifactKey;
use actix_web::HttpResponse;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// A response body with exactly one top-level field
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Upload accepted: `{"File": key}`
    File(ArtifactKey),
    /// Technique succeeded: `{"<field>": payload}`
    Success { field: &'static str, payload: AnalysisOutput },
    /// Anything went wrong: `{"Error": message}`
    Error(String),
}

impl Envelope {
    pub fn error(err: &AnalysisError) -> Self {
        Envelope::Error(err.to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Envelope::Error(_))
    }

    pub fn into_response(self) -> HttpResponse {
        HttpResponse::Ok().json(self)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Envelope::File(key) => map.serialize_entry("File", key)?,
            Envelope::Success { field, payload } => map.serialize_entry(field, payload)?,
            Envelope::Error(message) => map.serialize_entry("Error", message)?,
        }
        map.end()
    }
}
