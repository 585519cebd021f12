use chrono::Utc;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{
    domain::entities::employee::{EmployeeCode, EmployeeOverview},
    helper::error_chain_fmt,
    repositories::is_transient_store_error,
};

/// Employee identity repository implemented using Postgres
pub struct EmployeePostgresRepository {}

impl Default for EmployeePostgresRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(sqlx::FromRow)]
struct EmployeeOverviewRow {
    code: String,
    display_name: String,
    sample_count: i64,
    enrolled_at: chrono::DateTime<Utc>,
}

impl EmployeePostgresRepository {
    pub fn new() -> Self {
        Self {}
    }

    /// Inserts the employee or refreshes their display name, returning
    /// the row id.
    ///
    /// The returned row stays locked until the surrounding transaction
    /// ends, which is what serializes two concurrent replace-enrollments
    /// for the same employee.
    #[tracing::instrument(name = "Upserting employee in database", skip(self, db_executor))]
    pub async fn upsert_employee(
        &self,
        db_executor: impl PgExecutor<'_>,
        code: &EmployeeCode,
        display_name: &str,
    ) -> Result<Uuid, EmployeePostgresRepositoryError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
    INSERT INTO employees (id, code, display_name, created_at)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (code) DO UPDATE SET display_name = EXCLUDED.display_name
    RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code.as_ref())
        .bind(display_name)
        .bind(Utc::now())
        .fetch_one(db_executor)
        .await?;

        Ok(id)
    }

    #[tracing::instrument(name = "Fetching employee id by code", skip(self, db_executor))]
    pub async fn find_id_by_code(
        &self,
        db_executor: impl PgExecutor<'_>,
        code: &EmployeeCode,
    ) -> Result<Option<Uuid>, EmployeePostgresRepositoryError> {
        let id: Option<Uuid> = sqlx::query_scalar(r#"SELECT id FROM employees WHERE code = $1"#)
            .bind(code.as_ref())
            .fetch_optional(db_executor)
            .await?;

        Ok(id)
    }

    /// Removes the employee and, through the FK cascade, every embedding
    /// and attendance event they own. A single statement, so no lookup
    /// can observe an identity without its records.
    #[tracing::instrument(name = "Deleting employee from database", skip(self, db_executor))]
    pub async fn delete_by_code(
        &self,
        db_executor: impl PgExecutor<'_>,
        code: &EmployeeCode,
    ) -> Result<bool, EmployeePostgresRepositoryError> {
        let result = sqlx::query(r#"DELETE FROM employees WHERE code = $1"#)
            .bind(code.as_ref())
            .execute(db_executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(name = "Listing employees with sample counts", skip(self, db_executor))]
    pub async fn list_with_sample_counts(
        &self,
        db_executor: impl PgExecutor<'_>,
    ) -> Result<Vec<EmployeeOverview>, EmployeePostgresRepositoryError> {
        let rows: Vec<EmployeeOverviewRow> = sqlx::query_as(
            r#"
    SELECT e.code, e.display_name, e.created_at AS enrolled_at, COUNT(fe.id) AS sample_count
    FROM employees e
    LEFT JOIN face_embeddings fe ON fe.employee_id = e.id
    GROUP BY e.id
    ORDER BY e.code
            "#,
        )
        .fetch_all(db_executor)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| EmployeeOverview {
                code: row.code,
                display_name: row.display_name,
                sample_count: row.sample_count,
                enrolled_at: row.enrolled_at,
            })
            .collect())
    }
}

#[derive(thiserror::Error)]
pub enum EmployeePostgresRepositoryError {
    #[error(transparent)]
    DBError(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EmployeePostgresRepositoryError {
    pub fn is_transient(&self) -> bool {
        match self {
            EmployeePostgresRepositoryError::DBError(error) => is_transient_store_error(error),
            EmployeePostgresRepositoryError::Other(_) => false,
        }
    }
}

impl std::fmt::Debug for EmployeePostgresRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
