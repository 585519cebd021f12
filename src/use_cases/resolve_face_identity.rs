use sqlx::PgPool;
use tracing::info;

use crate::{
    configuration::Settings,
    domain::{
        entities::{
            face_embedding::{FaceEmbedding, FaceEmbeddingError},
            match_decision::MatchDecision,
        },
        services::identity_matcher,
    },
    helper::error_chain_fmt,
    ports::face_extractor_port::{FaceExtractionError, FaceExtractorPort},
    repositories::{
        face_gallery_postgres_repository::{
            FaceGalleryPostgresRepository, FaceGalleryPostgresRepositoryError,
        },
        store_retry::retry_on,
    },
    use_cases::extract_with_deadline,
};

/// Resolves the identity on a photograph against the enrolled gallery:
/// extract, retrieve the top-k nearest records, decide.
///
/// An ambiguous tie is a decision, not an error, at this level: callers
/// report it as "cannot confirm".
#[tracing::instrument(
    name = "Resolving face identity",
    skip(pool, gallery_repository, extractor, settings, image)
)]
pub async fn resolve_face_identity<E: FaceExtractorPort>(
    pool: &PgPool,
    gallery_repository: &FaceGalleryPostgresRepository,
    extractor: &E,
    settings: &Settings,
    image: &[u8],
) -> Result<MatchDecision, ResolveFaceIdentityError> {
    let vector = extract_with_deadline(extractor, &settings.extractor, image).await?;

    let embedding = FaceEmbedding::parse(vector, settings.gallery.embedding_dimension)?;

    let embedding_ref = &embedding;
    let metric = settings.gallery.distance_metric;
    let top_k = settings.gallery.top_k;

    let candidates = retry_on(
        &settings.store_retry,
        "nearest neighbors query",
        move || gallery_repository.nearest_neighbors(pool, embedding_ref, metric, top_k),
        FaceGalleryPostgresRepositoryError::is_transient,
    )
    .await?;

    let decision = identity_matcher::resolve(&candidates, settings.gallery.match_threshold);

    match &decision {
        MatchDecision::Identified(matched) => info!(
            employee_code = %matched.employee_code,
            distance = matched.distance,
            confidence = matched.confidence,
            "Identified employee"
        ),
        MatchDecision::Ambiguous {
            candidates,
            distance,
        } => info!(?candidates, distance, "Ambiguous match"),
        MatchDecision::Unknown { best_distance } => {
            info!(?best_distance, "No identity confirmed")
        }
    }

    Ok(decision)
}

#[derive(thiserror::Error)]
pub enum ResolveFaceIdentityError {
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
    #[error(transparent)]
    GalleryRepositoryError(#[from] FaceGalleryPostgresRepositoryError),
}

impl From<FaceExtractionError> for ResolveFaceIdentityError {
    fn from(error: FaceExtractionError) -> Self {
        match error {
            FaceExtractionError::NoFaceDetected => ResolveFaceIdentityError::NoFaceDetected,
            FaceExtractionError::AmbiguousFace => ResolveFaceIdentityError::AmbiguousFace,
            FaceExtractionError::ExtractionFailed(reason) => {
                ResolveFaceIdentityError::ExtractionFailed(reason)
            }
            FaceExtractionError::Timeout => ResolveFaceIdentityError::ExtractionTimeout,
        }
    }
}

impl std::fmt::Debug for ResolveFaceIdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
