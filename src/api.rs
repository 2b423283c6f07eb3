// HTTP routes
use actix_multipart::Multipart;
use actix_web::error::UrlencodedError;
use actix_web::{get, post, web, Error, HttpRequest, HttpResponse};
use log::warn;

use crate::app_state::AppState;
use crate::error::{error_body, AnalysisError, NO_FILENAME_SUBMITTED};
use crate::service::orchestrator::Technique;
use crate::service::{
    analysis_service, serve_artifact_service, steghide_technique, upload_service, zsteg_technique, AnalysisForm,
};

#[post("/upload")]
pub async fn upload(payload: Multipart, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    upload_service(payload, app_state).await
}

#[post("/process")]
pub async fn process(form: web::Form<AnalysisForm>, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    analysis_service(form.into_inner(), app_state, |_| Ok(Technique::BitPlanes)).await
}

#[post("/zsteg")]
pub async fn zsteg(form: web::Form<AnalysisForm>, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    analysis_service(form.into_inner(), app_state, zsteg_technique).await
}

#[post("/binwalk")]
pub async fn binwalk(form: web::Form<AnalysisForm>, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    analysis_service(form.into_inner(), app_state, |_| Ok(Technique::FileCarving)).await
}

#[post("/steghide")]
pub async fn steghide(form: web::Form<AnalysisForm>, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    analysis_service(form.into_inner(), app_state, steghide_technique).await
}

#[post("/exiftool")]
pub async fn exiftool(form: web::Form<AnalysisForm>, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    analysis_service(form.into_inner(), app_state, |_| Ok(Technique::Metadata)).await
}

#[post("/strings")]
pub async fn strings(form: web::Form<AnalysisForm>, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    analysis_service(form.into_inner(), app_state, |_| Ok(Technique::Strings)).await
}

#[get("/uploads/{key}")]
pub async fn uploads(path: web::Path<String>, app_state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    serve_artifact_service(path.into_inner(), app_state).await
}

/// A body that is not a form carries no filename
fn form_error_handler(err: UrlencodedError, _req: &HttpRequest) -> Error {
    warn!("Unreadable form body: {}", err);
    AnalysisError::InvalidInput(NO_FILENAME_SUBMITTED.to_string()).into()
}

pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(error_body("Not found."))
}

/// Register every route and the form error rendering
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::FormConfig::default().error_handler(form_error_handler))
        .service(upload)
        .service(process)
        .service(zsteg)
        .service(binwalk)
        .service(steghide)
        .service(exiftool)
        .service(strings)
        .service(uploads);
}
