use actix_multipart::form::{tempfile::TempFile, MultipartForm};
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use anyhow::Context;
use serde_json::json;
use sqlx::PgPool;

use crate::{
    configuration::Settings,
    domain::entities::match_decision::MatchDecision,
    helper::error_chain_fmt,
    repositories::{
        face_extractor_http_repository::FaceExtractorHttpRepository,
        face_gallery_postgres_repository::FaceGalleryPostgresRepository,
    },
    use_cases::resolve_face_identity::{resolve_face_identity, ResolveFaceIdentityError},
};

#[derive(Debug, MultipartForm)]
pub struct IdentifyFormData {
    #[multipart(rename = "photo")]
    pub photo: TempFile,
}

/// Tri-state answer: identified, not identified, or a typed error. A
/// failure is never collapsed into `identified: false`.
#[derive(Debug, serde::Serialize)]
pub struct IdentifyResponseBody {
    pub identified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_distance: Option<f32>,
}

#[tracing::instrument(
    name = "Identify employee from photo",
    skip(pool, gallery_repository, extractor, settings, form)
)]
pub async fn identify(
    pool: web::Data<PgPool>,
    gallery_repository: web::Data<FaceGalleryPostgresRepository>,
    extractor: web::Data<FaceExtractorHttpRepository>,
    settings: web::Data<Settings>,
    MultipartForm(form): MultipartForm<IdentifyFormData>,
) -> Result<HttpResponse, IdentifyError> {
    let image = tokio::fs::read(form.photo.file.path())
        .await
        .context("Failed to read the uploaded photo")?;

    let decision = resolve_face_identity(
        &pool,
        &gallery_repository,
        extractor.get_ref(),
        &settings,
        &image,
    )
    .await?;

    match decision {
        MatchDecision::Identified(matched) => Ok(HttpResponse::Ok().json(IdentifyResponseBody {
            identified: true,
            employee_code: Some(matched.employee_code),
            display_name: Some(matched.display_name),
            distance: Some(matched.distance),
            confidence: Some(matched.confidence),
            best_distance: None,
        })),
        MatchDecision::Unknown { best_distance } => {
            Ok(HttpResponse::Ok().json(IdentifyResponseBody {
                identified: false,
                employee_code: None,
                display_name: None,
                distance: None,
                confidence: None,
                best_distance,
            }))
        }
        MatchDecision::Ambiguous {
            candidates,
            distance,
        } => Err(IdentifyError::AmbiguousMatch {
            candidate_codes: candidates.into_iter().map(|c| c.employee_code).collect(),
            distance,
        }),
    }
}

#[derive(thiserror::Error)]
pub enum IdentifyError {
    #[error("Cannot confirm a single identity: {candidate_codes:?} are tied at distance {distance}")]
    AmbiguousMatch {
        candidate_codes: Vec<String>,
        distance: f32,
    },
    #[error(transparent)]
    ResolutionError(#[from] ResolveFaceIdentityError),
    #[error(transparent)]
    InternalError(#[from] anyhow::Error),
}

impl std::fmt::Debug for IdentifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for IdentifyError {
    fn status_code(&self) -> StatusCode {
        match self {
            IdentifyError::AmbiguousMatch { .. } => StatusCode::CONFLICT,
            IdentifyError::ResolutionError(error) => match error {
                ResolveFaceIdentityError::NoFaceDetected
                | ResolveFaceIdentityError::AmbiguousFace => StatusCode::BAD_REQUEST,
                ResolveFaceIdentityError::ExtractionTimeout => StatusCode::GATEWAY_TIMEOUT,
                ResolveFaceIdentityError::ExtractionFailed(_) => StatusCode::BAD_GATEWAY,
                ResolveFaceIdentityError::InvalidEmbedding(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ResolveFaceIdentityError::GalleryRepositoryError(e) if e.is_transient() => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ResolveFaceIdentityError::GalleryRepositoryError(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            IdentifyError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[tracing::instrument(name = "Response error from identify controller", skip(self), fields(error = %self))]
    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(json!({ "error": self.to_string() }))
    }
}
