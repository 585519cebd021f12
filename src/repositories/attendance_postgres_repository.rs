use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{
    domain::entities::attendance::{AttendanceEventKind, DailyAttendance},
    helper::error_chain_fmt,
    repositories::is_transient_store_error,
};

/// Attendance event log implemented using Postgres
pub struct AttendancePostgresRepository {}

impl Default for AttendancePostgresRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(sqlx::FromRow)]
struct DailyAttendanceRow {
    day: NaiveDate,
    first_check_in: Option<DateTime<Utc>>,
    last_check_out: Option<DateTime<Utc>>,
}

impl AttendancePostgresRepository {
    pub fn new() -> Self {
        Self {}
    }

    #[tracing::instrument(name = "Logging attendance event in database", skip(self, db_executor))]
    pub async fn log_event(
        &self,
        db_executor: impl PgExecutor<'_>,
        employee_id: Uuid,
        kind: AttendanceEventKind,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), AttendancePostgresRepositoryError> {
        sqlx::query(
            r#"
    INSERT INTO attendance_events (id, employee_id, kind, recorded_at, latitude, longitude)
    VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(employee_id)
        .bind(kind.as_str())
        .bind(Utc::now())
        .bind(latitude)
        .bind(longitude)
        .execute(db_executor)
        .await?;

        Ok(())
    }

    #[tracing::instrument(
        name = "Checking for an attendance event today",
        skip(self, db_executor)
    )]
    pub async fn has_event_today(
        &self,
        db_executor: impl PgExecutor<'_>,
        employee_id: Uuid,
        kind: AttendanceEventKind,
    ) -> Result<bool, AttendancePostgresRepositoryError> {
        let exists: bool = sqlx::query_scalar(
            r#"
    SELECT EXISTS (
        SELECT 1 FROM attendance_events
        WHERE employee_id = $1 AND kind = $2 AND recorded_at::date = CURRENT_DATE
    )
            "#,
        )
        .bind(employee_id)
        .bind(kind.as_str())
        .fetch_one(db_executor)
        .await?;

        Ok(exists)
    }

    /// Per-day attendance of an employee, newest day first: the first
    /// check-in and the last check-out of each day with any event.
    #[tracing::instrument(name = "Building attendance report", skip(self, db_executor))]
    pub async fn daily_report(
        &self,
        db_executor: impl PgExecutor<'_>,
        employee_id: Uuid,
    ) -> Result<Vec<DailyAttendance>, AttendancePostgresRepositoryError> {
        let rows: Vec<DailyAttendanceRow> = sqlx::query_as(
            r#"
    SELECT recorded_at::date AS day,
           MIN(recorded_at) FILTER (WHERE kind = 'check_in') AS first_check_in,
           MAX(recorded_at) FILTER (WHERE kind = 'check_out') AS last_check_out
    FROM attendance_events
    WHERE employee_id = $1
    GROUP BY recorded_at::date
    ORDER BY day DESC
            "#,
        )
        .bind(employee_id)
        .fetch_all(db_executor)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DailyAttendance {
                day: row.day,
                first_check_in: row.first_check_in,
                last_check_out: row.last_check_out,
            })
            .collect())
    }
}

#[derive(thiserror::Error)]
pub enum AttendancePostgresRepositoryError {
    #[error(transparent)]
    DBError(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AttendancePostgresRepositoryError {
    pub fn is_transient(&self) -> bool {
        match self {
            AttendancePostgresRepositoryError::DBError(error) => is_transient_store_error(error),
            AttendancePostgresRepositoryError::Other(_) => false,
        }
    }
}

impl std::fmt::Debug for AttendancePostgresRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
