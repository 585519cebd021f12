use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use serde_json::json;
use sqlx::PgPool;
use tracing::info;

use crate::{
    configuration::Settings,
    domain::entities::employee::{EmployeeCode, EmployeeCodeError},
    helper::error_chain_fmt,
    repositories::{
        employee_postgres_repository::{EmployeePostgresRepository, EmployeePostgresRepositoryError},
        store_retry::retry_on,
    },
};

#[tracing::instrument(name = "List enrolled employees", skip(pool, employee_repository, settings))]
pub async fn list_employees(
    pool: web::Data<PgPool>,
    employee_repository: web::Data<EmployeePostgresRepository>,
    settings: web::Data<Settings>,
) -> Result<HttpResponse, EmployeesError> {
    let pool = pool.get_ref();
    let employee_repository = employee_repository.get_ref();

    let employees = retry_on(
        &settings.store_retry,
        "list employees",
        move || employee_repository.list_with_sample_counts(pool),
        EmployeePostgresRepositoryError::is_transient,
    )
    .await?;

    Ok(HttpResponse::Ok().json(employees))
}

/// Removes the employee and every embedding and attendance event they
/// own. After this, no lookup can resolve to them.
#[tracing::instrument(name = "Deregister employee", skip(pool, employee_repository, settings))]
pub async fn deregister_employee(
    pool: web::Data<PgPool>,
    employee_repository: web::Data<EmployeePostgresRepository>,
    settings: web::Data<Settings>,
    path: web::Path<String>,
) -> Result<HttpResponse, EmployeesError> {
    let code = EmployeeCode::parse(&path.into_inner())?;

    let pool = pool.get_ref();
    let employee_repository = employee_repository.get_ref();
    let code_ref = &code;

    let deleted = retry_on(
        &settings.store_retry,
        "deregister employee",
        move || employee_repository.delete_by_code(pool, code_ref),
        EmployeePostgresRepositoryError::is_transient,
    )
    .await?;

    if !deleted {
        return Err(EmployeesError::UnknownEmployee(code.to_string()));
    }

    info!(employee_code = %code, "Deregistered employee");
    Ok(HttpResponse::Ok().json(json!({ "message": format!("Employee {} deregistered", code) })))
}

#[derive(thiserror::Error)]
pub enum EmployeesError {
    #[error(transparent)]
    InvalidEmployeeCode(#[from] EmployeeCodeError),
    #[error("No enrolled employee with code {0}")]
    UnknownEmployee(String),
    #[error(transparent)]
    RepositoryError(#[from] EmployeePostgresRepositoryError),
}

impl std::fmt::Debug for EmployeesError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for EmployeesError {
    fn status_code(&self) -> StatusCode {
        match self {
            EmployeesError::InvalidEmployeeCode(_) => StatusCode::BAD_REQUEST,
            EmployeesError::UnknownEmployee(_) => StatusCode::NOT_FOUND,
            EmployeesError::RepositoryError(e) if e.is_transient() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            EmployeesError::RepositoryError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[tracing::instrument(name = "Response error from employees controller", skip(self), fields(error = %self))]
    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(json!({ "error": self.to_string() }))
    }
}
