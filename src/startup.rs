use actix_web::{
    dev::Server,
    web::{self, Data},
    App, HttpServer,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::net::TcpListener;
use tracing::info;
use tracing_actix_web::TracingLogger;

use crate::{
    configuration::{DatabaseSettings, Settings},
    controllers::{
        attendance_report, check_in, check_out, deregister_employee, enroll, health_check,
        identify, list_employees,
    },
    repositories::{
        attendance_postgres_repository::AttendancePostgresRepository,
        employee_postgres_repository::EmployeePostgresRepository,
        face_extractor_http_repository::FaceExtractorHttpRepository,
        face_gallery_postgres_repository::{
            FaceGalleryPostgresRepository, FaceGalleryPostgresRepositoryError,
        },
        store_retry::retry_on,
    },
};

/// Holds the newly built server, and some useful properties
pub struct Application {
    server: Server,
    port: u16,
}

#[derive(thiserror::Error, Debug)]
pub enum ApplicationBuildError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error(transparent)]
    ExtractorClientError(#[from] reqwest::Error),
    #[error(transparent)]
    GalleryRepositoryError(#[from] FaceGalleryPostgresRepositoryError),
    /// Deployment inconsistency between the configuration and the
    /// store. Halts startup: per-request handling could only mask it.
    #[error("Gallery configuration error: {0}")]
    ConfigurationError(String),
}

impl Application {
    /// # Parameters
    /// - nb_workers: number of actix-web workers
    ///   if `None`, the number of available physical CPUs is used as the worker count.
    #[tracing::instrument(name = "Building application")]
    pub async fn build(
        settings: Settings,
        nb_workers: Option<usize>,
    ) -> Result<Self, ApplicationBuildError> {
        let connection_pool = get_connection_pool(&settings.database);

        check_gallery_dimension(&connection_pool, &settings).await?;

        let address = format!(
            "{}:{}",
            settings.application.host, settings.application.port
        );
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr().unwrap().port();

        let extractor = FaceExtractorHttpRepository::try_new(&settings.extractor)?;

        let server = run(listener, settings, nb_workers, connection_pool, extractor)?;

        Ok(Self { server, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// This function only returns when the application is stopped
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        info!("Running server ...");
        self.server.await
    }
}

/// listener: the consumer binds their own port
///
/// TracingLogger middleware: helps collecting telemetry data.
/// It generates a unique identifier for each incoming request: `request_id`.
///
/// # Parameters
/// - nb_workers: number of actix-web workers
///   if `None`, the number of available physical CPUs is used as the worker count.
pub fn run(
    listener: TcpListener,
    settings: Settings,
    nb_workers: Option<usize>,
    db_pool: PgPool,
    extractor: FaceExtractorHttpRepository,
) -> Result<Server, std::io::Error> {
    // Wraps the connection to a db in smart pointers
    let db_pool = Data::new(db_pool);

    // Wraps repositories in a `actix_web::Data` (`Arc`) to be able to register them
    // and access them from handlers.
    // Those repositories are shared among all threads.
    let employee_repository = Data::new(EmployeePostgresRepository::new());
    let gallery_repository = Data::new(FaceGalleryPostgresRepository::new());
    let attendance_repository = Data::new(AttendancePostgresRepository::new());
    let extractor = Data::new(extractor);
    let settings = Data::new(settings);

    // `move` to capture variables from the surrounding environment
    let server = HttpServer::new(move || {
        info!("Starting actix-web worker");

        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .route("/enroll", web::post().to(enroll))
            .route("/identify", web::post().to(identify))
            .route("/employees", web::get().to(list_employees))
            .route("/employees/{code}", web::delete().to(deregister_employee))
            .route("/attendance/check-in", web::post().to(check_in))
            .route("/attendance/check-out", web::post().to(check_out))
            .route("/attendance/{code}", web::get().to(attendance_report))
            .app_data(db_pool.clone())
            .app_data(employee_repository.clone())
            .app_data(gallery_repository.clone())
            .app_data(attendance_repository.clone())
            .app_data(extractor.clone())
            .app_data(settings.clone())
    })
    .listen(listener)?;

    // If no workers were set, use the actix-web settings (number of workers = number of physical CPUs)
    if let Some(nb_workers) = nb_workers {
        return Ok(server.workers(nb_workers).run());
    }

    // No await
    Ok(server.run())
}

// Or should we keep a clone of the pool connection in `Application` ?
pub fn get_connection_pool(settings: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(settings.with_db())
}

/// Compares the configured embedding dimension with the one declared on
/// the gallery column. Thresholds and embeddings are meaningless when
/// the two disagree, so a mismatch fails the build.
#[tracing::instrument(name = "Checking gallery dimension against configuration", skip(pool, settings))]
async fn check_gallery_dimension(
    pool: &PgPool,
    settings: &Settings,
) -> Result<(), ApplicationBuildError> {
    let gallery_repository = FaceGalleryPostgresRepository::new();
    let repository_ref = &gallery_repository;

    let declared = retry_on(
        &settings.store_retry,
        "gallery dimension check",
        move || repository_ref.declared_dimension(pool),
        FaceGalleryPostgresRepositoryError::is_transient,
    )
    .await?;

    match declared {
        Some(dimension) if dimension as usize == settings.gallery.embedding_dimension => {
            let enrolled = repository_ref.count_embeddings(pool).await?;
            info!(dimension, enrolled, "Gallery ready ✅");
            Ok(())
        }
        Some(dimension) => Err(ApplicationBuildError::ConfigurationError(format!(
            "configured embedding_dimension is {} but the store declares vector({})",
            settings.gallery.embedding_dimension, dimension
        ))),
        None => Err(ApplicationBuildError::ConfigurationError(
            "the face_embeddings.embedding column has no declared dimension".into(),
        )),
    }
}
