use async_trait::async_trait;

use crate::helper::error_chain_fmt;

/// Boundary to the face detection + embedding model.
///
/// The concrete model (local network, remote service, ...) stays behind
/// this trait: the engine only relies on "image bytes in, fixed-length
/// vector out, or a typed failure".
#[async_trait]
pub trait FaceExtractorPort {
    /// Extracts the embedding of the single face on the image.
    ///
    /// The raw vector is returned as produced by the model; dimension
    /// validation against the configured gallery dimension belongs to
    /// the caller.
    async fn extract(&self, image: &[u8]) -> Result<Vec<f32>, FaceExtractionError>;
}

#[derive(thiserror::Error)]
pub enum FaceExtractionError {
    #[error("No detectable face on the submitted image")]
    NoFaceDetected,
    /// More than one face: we reject rather than guess which one to
    /// enroll or identify.
    #[error("More than one face detected on the submitted image")]
    AmbiguousFace,
    #[error("The extractor failed to process the image: {0}")]
    ExtractionFailed(String),
    #[error("The extractor did not answer in time")]
    Timeout,
}

impl std::fmt::Debug for FaceExtractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
