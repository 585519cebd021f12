use std::{
    collections::HashMap,
    net::TcpListener,
    sync::{Arc, Mutex},
};

use actix_web::{web, App, HttpResponse, HttpServer};
use chrono::Utc;
use face_identification_service::{
    configuration::{get_configuration, DatabaseSettings},
    startup::{get_connection_pool, Application},
    telemetry::{get_tracing_subscriber, init_tracing_subscriber},
};
use fake::{faker::name::en::Name, Fake};
use serde_json::json;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use once_cell::sync::Lazy;

/// Dimension the test gallery is migrated with.
pub const EMBEDDING_DIMENSION: usize = 128;

// Ensures that the `tracing` stack is only initialized once using `once_cell`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    // We cannot assign the output of `get_tracing_subscriber` to a variable based on the value of `TEST_LOG`
    // because the sink is part of the type returned by `get_tracing_subscriber`, therefore they are not the
    // same type. We could work around it, but this is the most straight-forward way of moving forward.
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_tracing_subscriber(subscriber);
    } else {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_tracing_subscriber(subscriber);
    };
});

/// What the stub extractor answers for a given image payload.
#[derive(Debug, Clone)]
pub enum StubExtraction {
    Embedding(Vec<f32>),
    NoFace,
    AmbiguousFace,
}

type StubResponses = Arc<Mutex<HashMap<Vec<u8>, StubExtraction>>>;

/// In-process stand-in for the extractor sidecar: image bytes in,
/// whatever the test programmed out. Unprogrammed payloads answer
/// "no_face", like a sidecar shown an empty image.
pub struct StubExtractor {
    pub base_url: String,
    responses: StubResponses,
}

impl StubExtractor {
    pub fn spawn() -> Self {
        let responses: StubResponses = Arc::new(Mutex::new(HashMap::new()));
        let state = web::Data::new(responses.clone());

        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind stub extractor");
        let port = listener.local_addr().unwrap().port();

        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .route("/extract", web::post().to(stub_extract))
        })
        .listen(listener)
        .expect("Failed to listen on stub extractor port")
        .workers(1)
        .run();

        tokio::spawn(server);

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            responses,
        }
    }

    pub fn stub(&self, image: &[u8], extraction: StubExtraction) {
        self.responses
            .lock()
            .unwrap()
            .insert(image.to_vec(), extraction);
    }
}

async fn stub_extract(state: web::Data<StubResponses>, body: web::Bytes) -> HttpResponse {
    let programmed = state.lock().unwrap().get(body.as_ref()).cloned();

    match programmed {
        Some(StubExtraction::Embedding(embedding)) => {
            HttpResponse::Ok().json(json!({ "embedding": embedding }))
        }
        Some(StubExtraction::NoFace) | None => {
            HttpResponse::UnprocessableEntity().json(json!({ "error": "no_face" }))
        }
        Some(StubExtraction::AmbiguousFace) => {
            HttpResponse::UnprocessableEntity().json(json!({ "error": "ambiguous_face" }))
        }
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    /// Database connection used to assert checks thanks to db queries
    pub db_pool: PgPool,
    /// Programmable extractor sidecar
    pub extractor: StubExtractor,
}

/// A test API client / test suite
impl TestApp {
    pub fn get_test_employee(&self) -> (String, String) {
        let code = format!("emp-{}", Uuid::new_v4().simple());
        let display_name: String = Name().fake();
        (code, display_name)
    }

    pub async fn post_enroll(
        &self,
        employee_code: &str,
        display_name: &str,
        replace: Option<bool>,
        photo: Vec<u8>,
    ) -> reqwest::Response {
        let mut form = reqwest::multipart::Form::new()
            .text("employee_code", employee_code.to_string())
            .text("display_name", display_name.to_string())
            .part(
                "photo",
                reqwest::multipart::Part::bytes(photo)
                    .file_name("reference.jpg")
                    .mime_str("image/jpeg")
                    .unwrap(),
            );
        if let Some(replace) = replace {
            form = form.text("replace", replace.to_string());
        }

        reqwest::Client::new()
            .post(&format!("{}/enroll", &self.address))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_identify(&self, photo: Vec<u8>) -> reqwest::Response {
        let form = reqwest::multipart::Form::new().part(
            "photo",
            reqwest::multipart::Part::bytes(photo)
                .file_name("probe.jpg")
                .mime_str("image/jpeg")
                .unwrap(),
        );

        reqwest::Client::new()
            .post(&format!("{}/identify", &self.address))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_attendance(
        &self,
        endpoint: &str,
        photo: Vec<u8>,
        latitude: f64,
        longitude: f64,
    ) -> reqwest::Response {
        let form = reqwest::multipart::Form::new()
            .text("latitude", latitude.to_string())
            .text("longitude", longitude.to_string())
            .part(
                "photo",
                reqwest::multipart::Part::bytes(photo)
                    .file_name("checkpoint.jpg")
                    .mime_str("image/jpeg")
                    .unwrap(),
            );

        reqwest::Client::new()
            .post(&format!("{}/attendance/{}", &self.address, endpoint))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request")
    }
}

/// A unit vector along the given axis. Two different axes are at cosine
/// distance 1 from each other, far beyond any test threshold.
pub fn axis_embedding(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIMENSION];
    v[axis] = 1.0;
    v
}

/// A unit vector at the given cosine distance from `axis_embedding(axis)`,
/// rotated towards `other_axis`.
pub fn embedding_at_cosine_distance(axis: usize, other_axis: usize, distance: f32) -> Vec<f32> {
    assert_ne!(axis, other_axis);
    let cos = 1.0 - distance;
    let sin = (1.0 - cos * cos).sqrt();

    let mut v = vec![0.0; EMBEDDING_DIMENSION];
    v[axis] = cos;
    v[other_axis] = sin;
    v
}

/// Launches the server as a background task
/// When a tokio runtime is shut down all tasks spawned on it are dropped.
/// tokio::test spins up a new runtime at the beginning of each test case and they shut down at the end of each test case.
/// Therefore no need to implement any clean up logic to avoid leaking resources between test runs
pub async fn spawn_app() -> TestApp {
    // The first time `initialize` is invoked the code in `TRACING` is executed.
    // All other invocations will instead skip execution.
    Lazy::force(&TRACING);

    let extractor = StubExtractor::spawn();

    // Randomizes configuration to ensure test isolation
    let configuration = {
        let mut c = get_configuration().expect("Failed to read configuration.");
        // Uses a different database for each test case
        c.database.database_name = format!(
            "test_{}_{}",
            Utc::now().format("%Y-%m-%d_%H-%M-%S"),
            Uuid::new_v4()
        );
        // Uses a random OS port: port 0 is special-cased at the OS level:
        // trying to bind port 0 will trigger an OS scan for an available port which will then be bound to the application.
        c.application.port = 0;
        c.application.host = "127.0.0.1".to_string();

        // Points the engine at the programmable stub sidecar
        c.extractor.base_url = extractor.base_url.clone();

        c
    };

    // Creates and migrates the database
    set_up_database(&configuration.database).await;

    // Only one actix-web worker is needed for integration tests
    let application = Application::build(configuration.clone(), Some(1))
        .await
        .expect("Failed to build application.");

    let application_port = application.port();

    // Launches the application as a background task
    let _ = tokio::spawn(application.run_until_stopped());

    TestApp {
        address: format!("http://127.0.0.1:{}", application_port),
        port: application_port,
        db_pool: get_connection_pool(&configuration.database),
        extractor,
    }
}

/// Creates and migrates a database for integration test
async fn set_up_database(config: &DatabaseSettings) -> PgPool {
    // Creates database
    let mut connection = PgConnection::connect_with(&config.without_db())
        .await
        .expect("Failed to connect to Postgres");

    connection
        .execute(format!(r#"CREATE DATABASE "{}";"#, config.database_name).as_str())
        .await
        .expect("Failed to create database.");

    info!("🏗️  Created database: {}", config.database_name);

    let connection_pool = PgPool::connect_with(config.with_db())
        .await
        .expect("Failed to connect to Postgres.");

    // Migrates database
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database");

    info!(
        "🏗️  Migration done for database: {} ✅",
        config.database_name
    );

    connection_pool
}
