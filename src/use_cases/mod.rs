pub mod enroll_employee_face;
pub mod resolve_face_identity;

use crate::{
    configuration::ExtractorSettings,
    ports::face_extractor_port::{FaceExtractionError, FaceExtractorPort},
};

/// Runs the extractor under the configured deadline.
///
/// The operation as a whole is bounded: when the deadline expires the
/// call is abandoned and nothing gets committed downstream.
pub(crate) async fn extract_with_deadline<E: FaceExtractorPort + ?Sized>(
    extractor: &E,
    settings: &ExtractorSettings,
    image: &[u8],
) -> Result<Vec<f32>, FaceExtractionError> {
    match tokio::time::timeout(settings.timeout(), extractor.extract(image)).await {
        Ok(result) => result,
        Err(_) => Err(FaceExtractionError::Timeout),
    }
}
