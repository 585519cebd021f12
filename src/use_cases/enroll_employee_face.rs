use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::{
    configuration::Settings,
    domain::entities::{
        embedding_record::NewEmbeddingRecord,
        employee::EmployeeCode,
        face_embedding::{FaceEmbedding, FaceEmbeddingError},
    },
    helper::error_chain_fmt,
    ports::face_extractor_port::{FaceExtractionError, FaceExtractorPort},
    repositories::{
        employee_postgres_repository::{EmployeePostgresRepository, EmployeePostgresRepositoryError},
        face_gallery_postgres_repository::{
            FaceGalleryPostgresRepository, FaceGalleryPostgresRepositoryError,
        },
        is_transient_store_error,
        store_retry::retry_on,
    },
    use_cases::extract_with_deadline,
};

#[derive(Debug)]
pub struct EnrollmentRequest {
    pub code: EmployeeCode,
    pub display_name: String,
    pub image: Vec<u8>,
    /// Name of the uploaded reference photo, kept as provenance on the
    /// embedding record.
    pub source_image_name: String,
    /// Additive by default: a new reference photo becomes another
    /// sample. With `replace`, prior records are dropped atomically
    /// with the insert.
    pub replace: bool,
}

/// Enrolls a reference photo for an employee: extracts the embedding,
/// validates it, and persists a new record under the identity.
///
/// Returns the id of the created embedding record.
#[tracing::instrument(
    name = "Enrolling employee face",
    skip(pool, employee_repository, gallery_repository, extractor, settings, request),
    fields(employee_code = %request.code, replace = request.replace)
)]
pub async fn enroll_employee_face<E: FaceExtractorPort>(
    pool: &PgPool,
    employee_repository: &EmployeePostgresRepository,
    gallery_repository: &FaceGalleryPostgresRepository,
    extractor: &E,
    settings: &Settings,
    request: EnrollmentRequest,
) -> Result<Uuid, EnrollEmployeeFaceError> {
    let vector = extract_with_deadline(extractor, &settings.extractor, &request.image).await?;

    let embedding = FaceEmbedding::parse(vector, settings.gallery.embedding_dimension)?;

    let embedding_ref = &embedding;
    let request_ref = &request;

    // The gallery refuses to enroll a face it already knows under
    // another identity. Advisory: checked before the write, not under
    // the enrollment transaction.
    if let Some(guard_threshold) = settings.gallery.duplicate_guard_threshold {
        let metric = settings.gallery.distance_metric;
        let top_k = settings.gallery.top_k;

        let neighbors = retry_on(
            &settings.store_retry,
            "duplicate guard nearest query",
            move || gallery_repository.nearest_neighbors(pool, embedding_ref, metric, top_k),
            FaceGalleryPostgresRepositoryError::is_transient,
        )
        .await?;

        if let Some(other) = neighbors
            .iter()
            .find(|c| c.distance <= guard_threshold && c.employee_code != request.code.as_ref())
        {
            return Err(EnrollEmployeeFaceError::DuplicateFace {
                existing_code: other.employee_code.clone(),
                distance: other.distance,
            });
        }
    }

    let record_id = retry_on(
        &settings.store_retry,
        "enrollment transaction",
        || async move {
            let mut transaction = pool.begin().await?;

            // The upsert leaves the employee row locked until commit,
            // serializing concurrent replace-enrollments for the same
            // identity: a lookup sees either all prior records or the
            // single new one, never the in-between.
            let employee_id = employee_repository
                .upsert_employee(&mut transaction, &request_ref.code, &request_ref.display_name)
                .await?;

            if request_ref.replace {
                let dropped = gallery_repository
                    .delete_embeddings_of_employee(&mut transaction, employee_id)
                    .await?;
                info!(dropped, "Replacing prior embedding records");
            }

            let record = NewEmbeddingRecord::new(
                employee_id,
                embedding_ref.clone(),
                request_ref.source_image_name.clone(),
            );
            gallery_repository
                .insert_embedding(&mut transaction, &record)
                .await?;

            transaction.commit().await?;

            Ok::<Uuid, EnrollEmployeeFaceError>(record.id)
        },
        EnrollEmployeeFaceError::is_transient,
    )
    .await?;

    info!(%record_id, "Successfully enrolled employee face");
    Ok(record_id)
}

#[derive(thiserror::Error)]
pub enum EnrollEmployeeFaceError {
    #[error("No detectable face on the submitted image")]
    NoFaceDetected,
    #[error("More than one face detected on the submitted image")]
    AmbiguousFace,
    #[error("Face extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("Face extraction timed out")]
    ExtractionTimeout,
    #[error(transparent)]
    InvalidEmbedding(#[from] FaceEmbeddingError),
    #[error("A very similar face is already enrolled as {existing_code} (distance {distance})")]
    DuplicateFace { existing_code: String, distance: f32 },
    #[error(transparent)]
    GalleryRepositoryError(#[from] FaceGalleryPostgresRepositoryError),
    #[error(transparent)]
    EmployeeRepositoryError(#[from] EmployeePostgresRepositoryError),
    #[error("Store error during enrollment")]
    StoreError(#[from] sqlx::Error),
}

impl EnrollEmployeeFaceError {
    pub fn is_transient(&self) -> bool {
        match self {
            EnrollEmployeeFaceError::GalleryRepositoryError(e) => e.is_transient(),
            EnrollEmployeeFaceError::EmployeeRepositoryError(e) => e.is_transient(),
            EnrollEmployeeFaceError::StoreError(e) => is_transient_store_error(e),
            _ => false,
        }
    }
}

impl From<FaceExtractionError> for EnrollEmployeeFaceError {
    fn from(error: FaceExtractionError) -> Self {
        match error {
            FaceExtractionError::NoFaceDetected => EnrollEmployeeFaceError::NoFaceDetected,
            FaceExtractionError::AmbiguousFace => EnrollEmployeeFaceError::AmbiguousFace,
            FaceExtractionError::ExtractionFailed(reason) => {
                EnrollEmployeeFaceError::ExtractionFailed(reason)
            }
            FaceExtractionError::Timeout => EnrollEmployeeFaceError::ExtractionTimeout,
        }
    }
}

impl std::fmt::Debug for EnrollEmployeeFaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
