pub mod attendance_postgres_repository;
pub mod employee_postgres_repository;
pub mod face_extractor_http_repository;
pub mod face_gallery_postgres_repository;
pub mod store_retry;

/// Classifies a sqlx error as a transient store availability problem,
/// worth a bounded retry, as opposed to a real query/data error.
pub fn is_transient_store_error(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}
