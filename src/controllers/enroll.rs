use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use anyhow::Context;
use serde_json::json;
use sqlx::PgPool;
use tracing::info;

use crate::{
    configuration::Settings,
    domain::entities::employee::{EmployeeCode, EmployeeCodeError},
    helper::error_chain_fmt,
    repositories::{
        employee_postgres_repository::EmployeePostgresRepository,
        face_extractor_http_repository::FaceExtractorHttpRepository,
        face_gallery_postgres_repository::FaceGalleryPostgresRepository,
    },
    use_cases::enroll_employee_face::{
        enroll_employee_face, EnrollEmployeeFaceError, EnrollmentRequest,
    },
};

#[derive(Debug, MultipartForm)]
pub struct EnrollFormData {
    pub employee_code: Text<String>,
    pub display_name: Text<String>,
    /// Defaults to additive enrollment when absent.
    pub replace: Option<Text<bool>>,
    #[multipart(rename = "photo")]
    pub photo: TempFile,
}

#[tracing::instrument(
    name = "Enroll employee face",
    skip(pool, employee_repository, gallery_repository, extractor, settings, form)
)]
pub async fn enroll(
    pool: web::Data<PgPool>,
    employee_repository: web::Data<EmployeePostgresRepository>,
    gallery_repository: web::Data<FaceGalleryPostgresRepository>,
    extractor: web::Data<FaceExtractorHttpRepository>,
    settings: web::Data<Settings>,
    MultipartForm(form): MultipartForm<EnrollFormData>,
) -> Result<HttpResponse, EnrollError> {
    let code = EmployeeCode::parse(&form.employee_code)?;

    let display_name = form.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(EnrollError::InvalidDisplayName);
    }

    let image = tokio::fs::read(form.photo.file.path())
        .await
        .context("Failed to read the uploaded photo")?;

    let source_image_name = form
        .photo
        .file_name
        .clone()
        .unwrap_or_else(|| format!("{}.jpg", code));

    info!(employee_code = %code, image_bytes = image.len(), "Enrolling reference photo");

    let record_id = enroll_employee_face(
        &pool,
        &employee_repository,
        &gallery_repository,
        extractor.get_ref(),
        &settings,
        EnrollmentRequest {
            code,
            display_name,
            image,
            source_image_name,
            replace: form.replace.map(|t| t.0).unwrap_or(false),
        },
    )
    .await?;

    Ok(HttpResponse::Created().json(json!({ "record_id": record_id })))
}

#[derive(thiserror::Error)]
pub enum EnrollError {
    #[error(transparent)]
    InvalidEmployeeCode(#[from] EmployeeCodeError),
    #[error("A display name cannot be empty")]
    InvalidDisplayName,
    #[error(transparent)]
    EnrollmentError(#[from] EnrollEmployeeFaceError),
    #[error(transparent)]
    InternalError(#[from] anyhow::Error),
}

impl std::fmt::Debug for EnrollError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for EnrollError {
    fn status_code(&self) -> StatusCode {
        match self {
            EnrollError::InvalidEmployeeCode(_) | EnrollError::InvalidDisplayName => {
                StatusCode::BAD_REQUEST
            }
            EnrollError::EnrollmentError(error) => match error {
                EnrollEmployeeFaceError::NoFaceDetected
                | EnrollEmployeeFaceError::AmbiguousFace => StatusCode::BAD_REQUEST,
                EnrollEmployeeFaceError::DuplicateFace { .. } => StatusCode::CONFLICT,
                EnrollEmployeeFaceError::ExtractionTimeout => StatusCode::GATEWAY_TIMEOUT,
                EnrollEmployeeFaceError::ExtractionFailed(_) => StatusCode::BAD_GATEWAY,
                EnrollEmployeeFaceError::InvalidEmbedding(_) => StatusCode::INTERNAL_SERVER_ERROR,
                e if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            EnrollError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[tracing::instrument(name = "Response error from enroll controller", skip(self), fields(error = %self))]
    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(json!({ "error": self.to_string() }))
    }
}
