use pgvector::Vector;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{
    domain::entities::{
        embedding_record::{NeighborCandidate, NewEmbeddingRecord},
        face_embedding::{DistanceMetric, FaceEmbedding},
    },
    helper::error_chain_fmt,
    repositories::is_transient_store_error,
};

/// Gallery of enrolled face embeddings, persisted in Postgres with the
/// pgvector extension.
///
/// The store only ranks: it answers "the k nearest records and their
/// distances", ordered by the metric's operator so the ANN index can be
/// used. All decision policy lives in the identity matcher.
pub struct FaceGalleryPostgresRepository {}

impl Default for FaceGalleryPostgresRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(sqlx::FromRow)]
struct NeighborRow {
    record_id: Uuid,
    employee_id: Uuid,
    employee_code: String,
    display_name: String,
    distance: f32,
}

impl FaceGalleryPostgresRepository {
    pub fn new() -> Self {
        Self {}
    }

    /// Inserts a new embedding record. Acknowledged only once durable:
    /// callers run this inside a transaction they commit.
    #[tracing::instrument(
        name = "Saving new embedding record in database",
        skip(self, db_executor, record),
        fields(record_id = %record.id, employee_id = %record.employee_id)
    )]
    pub async fn insert_embedding(
        &self,
        db_executor: impl PgExecutor<'_>,
        record: &NewEmbeddingRecord,
    ) -> Result<(), FaceGalleryPostgresRepositoryError> {
        sqlx::query(
            r#"
    INSERT INTO face_embeddings (id, employee_id, embedding, source_image_name, created_at)
    VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id)
        .bind(record.employee_id)
        .bind(Vector::from(record.embedding.as_slice().to_vec()))
        .bind(&record.source_image_name)
        .bind(record.created_at)
        .execute(db_executor)
        .await?;

        Ok(())
    }

    #[tracing::instrument(
        name = "Deleting all embedding records of an employee",
        skip(self, db_executor)
    )]
    pub async fn delete_embeddings_of_employee(
        &self,
        db_executor: impl PgExecutor<'_>,
        employee_id: Uuid,
    ) -> Result<u64, FaceGalleryPostgresRepositoryError> {
        let result = sqlx::query(r#"DELETE FROM face_embeddings WHERE employee_id = $1"#)
            .bind(employee_id)
            .execute(db_executor)
            .await?;

        Ok(result.rows_affected())
    }

    /// The k gallery records nearest to the query embedding, with their
    /// distances under the given metric, closest first.
    ///
    /// The join guarantees no candidate of a deregistered employee is
    /// ever returned: the FK cascade removed their embeddings in the
    /// same transaction that removed the identity row.
    #[tracing::instrument(
        name = "Querying nearest embedding records",
        skip(self, db_executor, query_embedding)
    )]
    pub async fn nearest_neighbors(
        &self,
        db_executor: impl PgExecutor<'_>,
        query_embedding: &FaceEmbedding,
        metric: DistanceMetric,
        k: u16,
    ) -> Result<Vec<NeighborCandidate>, FaceGalleryPostgresRepositoryError> {
        // The operator comes from the metric enum, never from user input.
        let statement = format!(
            r#"
    SELECT fe.id AS record_id, fe.employee_id, e.code AS employee_code, e.display_name,
           (fe.embedding {operator} $1)::float4 AS distance
    FROM face_embeddings fe
    JOIN employees e ON e.id = fe.employee_id
    ORDER BY fe.embedding {operator} $1
    LIMIT $2
            "#,
            operator = metric.sql_operator()
        );

        let rows: Vec<NeighborRow> = sqlx::query_as(&statement)
            .bind(Vector::from(query_embedding.as_slice().to_vec()))
            .bind(i64::from(k))
            .fetch_all(db_executor)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| NeighborCandidate {
                record_id: row.record_id,
                employee_id: row.employee_id,
                employee_code: row.employee_code,
                display_name: row.display_name,
                distance: row.distance,
            })
            .collect())
    }

    #[tracing::instrument(name = "Counting embedding records", skip(self, db_executor))]
    pub async fn count_embeddings(
        &self,
        db_executor: impl PgExecutor<'_>,
    ) -> Result<i64, FaceGalleryPostgresRepositoryError> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM face_embeddings"#)
            .fetch_one(db_executor)
            .await?;

        Ok(count)
    }

    /// Dimension declared on the `embedding vector(D)` column, read from
    /// the catalog. `None` if the column was created without one.
    ///
    /// For the pgvector type the typmod is the dimension itself.
    #[tracing::instrument(name = "Reading declared gallery dimension", skip(self, db_executor))]
    pub async fn declared_dimension(
        &self,
        db_executor: impl PgExecutor<'_>,
    ) -> Result<Option<i32>, FaceGalleryPostgresRepositoryError> {
        let typmod: Option<i32> = sqlx::query_scalar(
            r#"
    SELECT atttypmod FROM pg_attribute
    WHERE attrelid = 'face_embeddings'::regclass
      AND attname = 'embedding'
      AND NOT attisdropped
            "#,
        )
        .fetch_optional(db_executor)
        .await?;

        Ok(typmod.filter(|&m| m > 0))
    }
}

#[derive(thiserror::Error)]
pub enum FaceGalleryPostgresRepositoryError {
    #[error(transparent)]
    DBError(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FaceGalleryPostgresRepositoryError {
    pub fn is_transient(&self) -> bool {
        match self {
            FaceGalleryPostgresRepositoryError::DBError(error) => is_transient_store_error(error),
            FaceGalleryPostgresRepositoryError::Other(_) => false,
        }
    }
}

impl std::fmt::Debug for FaceGalleryPostgresRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
