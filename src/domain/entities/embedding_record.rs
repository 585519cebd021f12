use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::face_embedding::FaceEmbedding;

/// A reference embedding about to be persisted for an employee.
///
/// Embeddings are write-once: a correction is a delete followed by an
/// insert, never an in-place update.
#[derive(Debug)]
pub struct NewEmbeddingRecord {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub embedding: FaceEmbedding,
    /// Name of the uploaded reference photo, kept as provenance.
    pub source_image_name: String,
    pub created_at: DateTime<Utc>,
}

impl NewEmbeddingRecord {
    pub fn new(employee_id: Uuid, embedding: FaceEmbedding, source_image_name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            employee_id,
            embedding,
            source_image_name,
            created_at: Utc::now(),
        }
    }
}

/// A gallery record returned by a nearest-neighbor query, with its
/// distance to the query embedding under the configured metric.
#[derive(Debug, Clone)]
pub struct NeighborCandidate {
    pub record_id: Uuid,
    pub employee_id: Uuid,
    pub employee_code: String,
    pub display_name: String,
    pub distance: f32,
}
