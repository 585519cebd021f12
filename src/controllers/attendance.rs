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
    domain::{
        entities::{
            attendance::AttendanceEventKind,
            employee::{EmployeeCode, EmployeeCodeError},
            match_decision::MatchDecision,
        },
        services::geofence::is_within_geofence,
    },
    helper::error_chain_fmt,
    repositories::{
        attendance_postgres_repository::{
            AttendancePostgresRepository, AttendancePostgresRepositoryError,
        },
        employee_postgres_repository::{EmployeePostgresRepository, EmployeePostgresRepositoryError},
        face_extractor_http_repository::FaceExtractorHttpRepository,
        face_gallery_postgres_repository::FaceGalleryPostgresRepository,
        store_retry::retry_on,
    },
    use_cases::resolve_face_identity::{resolve_face_identity, ResolveFaceIdentityError},
};

#[derive(Debug, MultipartForm)]
pub struct AttendanceFormData {
    #[multipart(rename = "photo")]
    pub photo: TempFile,
    pub latitude: Text<f64>,
    pub longitude: Text<f64>,
}

#[tracing::instrument(
    name = "Check in employee",
    skip(pool, gallery_repository, attendance_repository, extractor, settings, form)
)]
pub async fn check_in(
    pool: web::Data<PgPool>,
    gallery_repository: web::Data<FaceGalleryPostgresRepository>,
    attendance_repository: web::Data<AttendancePostgresRepository>,
    extractor: web::Data<FaceExtractorHttpRepository>,
    settings: web::Data<Settings>,
    form: MultipartForm<AttendanceFormData>,
) -> Result<HttpResponse, AttendanceError> {
    record_attendance(
        &pool,
        &gallery_repository,
        &attendance_repository,
        &extractor,
        &settings,
        form.into_inner(),
        AttendanceEventKind::CheckIn,
    )
    .await
}

#[tracing::instrument(
    name = "Check out employee",
    skip(pool, gallery_repository, attendance_repository, extractor, settings, form)
)]
pub async fn check_out(
    pool: web::Data<PgPool>,
    gallery_repository: web::Data<FaceGalleryPostgresRepository>,
    attendance_repository: web::Data<AttendancePostgresRepository>,
    extractor: web::Data<FaceExtractorHttpRepository>,
    settings: web::Data<Settings>,
    form: MultipartForm<AttendanceFormData>,
) -> Result<HttpResponse, AttendanceError> {
    record_attendance(
        &pool,
        &gallery_repository,
        &attendance_repository,
        &extractor,
        &settings,
        form.into_inner(),
        AttendanceEventKind::CheckOut,
    )
    .await
}

/// Shared flow of both attendance endpoints: geofence, identify, refuse
/// a second same-day event, log.
async fn record_attendance(
    pool: &PgPool,
    gallery_repository: &FaceGalleryPostgresRepository,
    attendance_repository: &AttendancePostgresRepository,
    extractor: &FaceExtractorHttpRepository,
    settings: &Settings,
    form: AttendanceFormData,
    kind: AttendanceEventKind,
) -> Result<HttpResponse, AttendanceError> {
    let latitude = form.latitude.0;
    let longitude = form.longitude.0;

    if let Some(geofence) = &settings.geofence {
        if !is_within_geofence(geofence, latitude, longitude) {
            return Err(AttendanceError::OutsideGeofence);
        }
    }

    let image = tokio::fs::read(form.photo.file.path())
        .await
        .context("Failed to read the uploaded photo")?;

    let decision =
        resolve_face_identity(pool, gallery_repository, extractor, settings, &image).await?;

    let matched = match decision {
        MatchDecision::Identified(matched) => matched,
        MatchDecision::Ambiguous { .. } => return Err(AttendanceError::AmbiguousMatch),
        MatchDecision::Unknown { .. } => return Err(AttendanceError::NotRecognized),
    };

    let employee_id = matched.employee_id;

    let already_recorded = retry_on(
        &settings.store_retry,
        "attendance event lookup",
        move || attendance_repository.has_event_today(pool, employee_id, kind),
        AttendancePostgresRepositoryError::is_transient,
    )
    .await?;

    if already_recorded {
        return Err(AttendanceError::AlreadyRecordedToday { kind });
    }

    retry_on(
        &settings.store_retry,
        "attendance event insert",
        move || attendance_repository.log_event(pool, employee_id, kind, latitude, longitude),
        AttendancePostgresRepositoryError::is_transient,
    )
    .await?;

    info!(employee_code = %matched.employee_code, %kind, "Recorded attendance event");
    Ok(HttpResponse::Ok().json(json!({
        "message": format!("{} recorded for {}", kind, matched.employee_code),
        "employee_code": matched.employee_code,
        "confidence": matched.confidence,
    })))
}

#[tracing::instrument(
    name = "Attendance report for employee",
    skip(pool, employee_repository, attendance_repository, settings)
)]
pub async fn attendance_report(
    pool: web::Data<PgPool>,
    employee_repository: web::Data<EmployeePostgresRepository>,
    attendance_repository: web::Data<AttendancePostgresRepository>,
    settings: web::Data<Settings>,
    path: web::Path<String>,
) -> Result<HttpResponse, AttendanceError> {
    let code = EmployeeCode::parse(&path.into_inner())?;

    let pool = pool.get_ref();
    let employee_repository = employee_repository.get_ref();
    let attendance_repository = attendance_repository.get_ref();
    let code_ref = &code;

    let employee_id = retry_on(
        &settings.store_retry,
        "employee lookup",
        move || employee_repository.find_id_by_code(pool, code_ref),
        EmployeePostgresRepositoryError::is_transient,
    )
    .await?
    .ok_or_else(|| AttendanceError::UnknownEmployee(code.to_string()))?;

    let records = retry_on(
        &settings.store_retry,
        "attendance report query",
        move || attendance_repository.daily_report(pool, employee_id),
        AttendancePostgresRepositoryError::is_transient,
    )
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "employee_code": code.to_string(),
        "records": records,
    })))
}

#[derive(thiserror::Error)]
pub enum AttendanceError {
    #[error(transparent)]
    InvalidEmployeeCode(#[from] EmployeeCodeError),
    #[error("The reported position is outside the allowed area")]
    OutsideGeofence,
    #[error("Face not recognized")]
    NotRecognized,
    #[error("Cannot confirm a single identity for the submitted photo")]
    AmbiguousMatch,
    #[error("A {kind} event was already recorded today")]
    AlreadyRecordedToday { kind: AttendanceEventKind },
    #[error("No enrolled employee with code {0}")]
    UnknownEmployee(String),
    #[error(transparent)]
    ResolutionError(#[from] ResolveFaceIdentityError),
    #[error(transparent)]
    AttendanceRepositoryError(#[from] AttendancePostgresRepositoryError),
    #[error(transparent)]
    EmployeeRepositoryError(#[from] EmployeePostgresRepositoryError),
    #[error(transparent)]
    InternalError(#[from] anyhow::Error),
}

impl std::fmt::Debug for AttendanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        match self {
            AttendanceError::InvalidEmployeeCode(_) => StatusCode::BAD_REQUEST,
            AttendanceError::OutsideGeofence => StatusCode::FORBIDDEN,
            AttendanceError::NotRecognized => StatusCode::UNAUTHORIZED,
            AttendanceError::AmbiguousMatch => StatusCode::CONFLICT,
            AttendanceError::AlreadyRecordedToday { .. } => StatusCode::CONFLICT,
            AttendanceError::UnknownEmployee(_) => StatusCode::NOT_FOUND,
            AttendanceError::ResolutionError(error) => match error {
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
            AttendanceError::AttendanceRepositoryError(e) if e.is_transient() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AttendanceError::EmployeeRepositoryError(e) if e.is_transient() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AttendanceError::AttendanceRepositoryError(_)
            | AttendanceError::EmployeeRepositoryError(_)
            | AttendanceError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[tracing::instrument(name = "Response error from attendance controller", skip(self), fields(error = %self))]
    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(json!({ "error": self.to_string() }))
    }
}
