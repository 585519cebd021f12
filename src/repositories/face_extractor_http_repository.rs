use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::{
    configuration::ExtractorSettings,
    ports::face_extractor_port::{FaceExtractionError, FaceExtractorPort},
};

/// [`FaceExtractorPort`] implemented against the extractor sidecar's
/// HTTP API: `POST /extract` with the raw image bytes.
///
/// `200 {"embedding": [...]}` carries the vector; `422 {"error":
/// "no_face" | "ambiguous_face"}` carries the detection failures. Any
/// other answer is an extraction failure.
pub struct FaceExtractorHttpRepository {
    client: reqwest::Client,
    extract_url: String,
}

#[derive(Debug, Deserialize)]
struct ExtractResponseBody {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ExtractErrorBody {
    error: String,
}

impl FaceExtractorHttpRepository {
    /// The client timeout doubles the engine-level timeout so a stuck
    /// connection cannot outlive the operation it belongs to.
    pub fn try_new(settings: &ExtractorSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;

        Ok(Self {
            client,
            extract_url: settings.extract_url(),
        })
    }
}

#[async_trait]
impl FaceExtractorPort for FaceExtractorHttpRepository {
    #[tracing::instrument(name = "Requesting embedding from the extractor", skip(self, image))]
    async fn extract(&self, image: &[u8]) -> Result<Vec<f32>, FaceExtractionError> {
        let response = self
            .client
            .post(&self.extract_url)
            .body(image.to_vec())
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    FaceExtractionError::Timeout
                } else {
                    FaceExtractionError::ExtractionFailed(error.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            let body: ExtractErrorBody = response
                .json()
                .await
                .map_err(|error| FaceExtractionError::ExtractionFailed(error.to_string()))?;

            return Err(match body.error.as_str() {
                "no_face" => FaceExtractionError::NoFaceDetected,
                "ambiguous_face" => FaceExtractionError::AmbiguousFace,
                other => FaceExtractionError::ExtractionFailed(format!(
                    "Unknown extractor error code: {}",
                    other
                )),
            });
        }

        if !status.is_success() {
            return Err(FaceExtractionError::ExtractionFailed(format!(
                "Extractor answered with status {}",
                status
            )));
        }

        let body: ExtractResponseBody = response
            .json()
            .await
            .map_err(|error| FaceExtractionError::ExtractionFailed(error.to_string()))?;

        debug!(dimension = body.embedding.len(), "Received embedding");

        Ok(body.embedding)
    }
}
