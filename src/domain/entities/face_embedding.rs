use serde::Deserialize;

use crate::helper::error_chain_fmt;

/// A face embedding of the dimension the gallery is configured for.
///
/// Construction goes through [`FaceEmbedding::parse`] so a vector of the
/// wrong length can never reach the store or the matcher: a mismatch is
/// a typed error, never a truncation or padding.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceEmbedding(Vec<f32>);

impl FaceEmbedding {
    pub fn parse(
        vector: Vec<f32>,
        expected_dimension: usize,
    ) -> Result<FaceEmbedding, FaceEmbeddingError> {
        if vector.len() != expected_dimension {
            return Err(FaceEmbeddingError::DimensionMismatch {
                expected: expected_dimension,
                actual: vector.len(),
            });
        }

        Ok(Self(vector))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

#[derive(thiserror::Error)]
pub enum FaceEmbeddingError {
    #[error("Expected an embedding of dimension {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl std::fmt::Debug for FaceEmbeddingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// The distance metric the gallery is configured with.
///
/// Thresholds are metric-specific: a deployment picks one metric and
/// sticks with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Euclidean,
    Cosine,
}

impl DistanceMetric {
    /// The pgvector distance operator for this metric.
    pub fn sql_operator(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "<->",
            DistanceMetric::Cosine => "<=>",
        }
    }

    /// Distance between two equal-length vectors. Matches what pgvector
    /// computes with [`Self::sql_operator`]; used by unit tests and the
    /// geometry-free parts of the engine.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());

        match self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

                if norm_a == 0.0 || norm_b == 0.0 {
                    // Degenerate embeddings carry no direction: report
                    // them as maximally distant rather than dividing by zero.
                    return 1.0;
                }

                1.0 - dot / (norm_a * norm_b)
            }
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::Euclidean => write!(f, "euclidean"),
            DistanceMetric::Cosine => write!(f, "cosine"),
        }
    }
}
