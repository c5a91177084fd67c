use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use chrono::Local;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tracing::info;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::scheduling::directory::{
    DriverProfile, HttpDirectoryClient, InMemoryDirectory, UserProfile, VendorProfile,
};
use crate::scheduling::geo::{CachingProvider, GoogleRoutesClient};
use crate::scheduling::store::InMemoryBookingStore;
use crate::scheduling::{
    BookingId, CreateScheduleRequest, DriverId, RouteCompatibilityChecker, SchedulingService,
    UserId, VendorId,
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SchedulingService>,
    pub readiness: Arc<AtomicBool>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(service: Arc<SchedulingService>) -> Self {
        Self {
            service,
            readiness: Arc::new(AtomicBool::new(false)),
            metrics: None,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/schedules", post(create_schedule_endpoint))
        .route(
            "/api/v1/bookings/:id/assign-driver/:driver_id",
            post(assign_driver_endpoint),
        )
        .route(
            "/api/v1/bookings/:id/vendor/:vendor_id",
            put(assign_vendor_endpoint),
        )
        .route("/api/v1/bookings/:id", get(booking_endpoint))
        .route("/api/v1/users/:id/bookings", get(user_bookings_endpoint))
        .route("/api/v1/drivers/:id/bookings", get(driver_bookings_endpoint))
        .route("/api/v1/drivers/:id/slots", get(driver_slots_endpoint))
        .with_state(state)
}

/// Builds the production service stack from configuration: an in-memory
/// booking store, the cached Google routes provider, and either the remote
/// directory service or a seeded local one.
pub fn build_service(config: &AppConfig) -> Result<Arc<SchedulingService>, AppError> {
    let store = Arc::new(InMemoryBookingStore::new());
    let provider = CachingProvider::new(GoogleRoutesClient::new(config.geo.clone())?);
    let checker = RouteCompatibilityChecker::new(Arc::new(provider));

    let service = match &config.directory.base_url {
        Some(base_url) => {
            let client = Arc::new(
                HttpDirectoryClient::new(base_url.clone(), config.geo.timeout_secs)
                    .map_err(|err| {
                        AppError::Scheduling(crate::scheduling::ServiceError::Directory(
                            err.to_string(),
                        ))
                    })?,
            );
            info!(%base_url, "using remote directory service");
            SchedulingService::new(store, client.clone(), client.clone(), client, checker)
        }
        None => {
            let directory = Arc::new(seeded_directory());
            info!("DIRECTORY_BASE_URL unset, using seeded in-memory directory");
            SchedulingService::new(
                store,
                directory.clone(),
                directory.clone(),
                directory,
                checker,
            )
        }
    };

    Ok(Arc::new(service))
}

/// Development fixtures so the service is usable without the upstream
/// directory deployment.
pub fn seeded_directory() -> InMemoryDirectory {
    let directory = InMemoryDirectory::new();
    directory.insert_driver(DriverProfile {
        driver_id: DriverId(501),
        driver_name: "Ramesh Pawar".to_string(),
        contact_no: Some("9800000501".to_string()),
        alt_contact_no: None,
    });
    directory.insert_driver(DriverProfile {
        driver_id: DriverId(502),
        driver_name: "Sunita Jadhav".to_string(),
        contact_no: Some("9800000502".to_string()),
        alt_contact_no: None,
    });
    directory.insert_user(UserProfile {
        id: UserId(1),
        user_name: "Asha".to_string(),
        last_name: Some("Kulkarni".to_string()),
        email: Some("asha@example.com".to_string()),
        phone: Some("9700000001".to_string()),
        gender: None,
    });
    directory.insert_user(UserProfile {
        id: UserId(2),
        user_name: "Nikhil".to_string(),
        last_name: Some("Deshmukh".to_string()),
        email: Some("nikhil@example.com".to_string()),
        phone: Some("9700000002".to_string()),
        gender: None,
    });
    directory.insert_vendor(VendorProfile {
        id: VendorId(9),
        vendor_company_name: "City Fleet Services".to_string(),
        contact_no: Some("9600000009".to_string()),
        alternate_mobile_no: None,
        city: Some("Pune".to_string()),
        vendor_email: None,
    });
    directory
}

pub async fn run(config: AppConfig) -> Result<(), AppError> {
    // reqwest's blocking client spins up its own runtime and must not be
    // constructed on an async worker thread.
    let build_config = config.clone();
    let service = run_blocking(move || build_service(&build_config)).await??;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let mut state = AppState::new(service);
    state.metrics = Some(prometheus_handle);
    let readiness_flag = state.readiness.clone();

    let app = router(state).layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "shift slot scheduler ready");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// The scheduling service does blocking store, directory, and distance I/O,
/// so every call hops onto the blocking pool.
async fn run_blocking<T, F>(task: F) -> Result<T, AppError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| AppError::Server(axum::Error::new(err)))
}

async fn create_schedule_endpoint(
    State(state): State<AppState>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.service.clone();
    let booking = run_blocking(move || service.create_schedule(request)).await??;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn assign_driver_endpoint(
    State(state): State<AppState>,
    Path((booking_id, driver_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.service.clone();
    let report = run_blocking(move || {
        service.assign_driver(BookingId(booking_id), DriverId(driver_id))
    })
    .await?;
    Ok(Json(report))
}

async fn assign_vendor_endpoint(
    State(state): State<AppState>,
    Path((booking_id, vendor_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.service.clone();
    let booking =
        run_blocking(move || service.assign_vendor(BookingId(booking_id), VendorId(vendor_id)))
            .await??;
    Ok(Json(booking))
}

async fn booking_endpoint(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.service.clone();
    let view = run_blocking(move || service.booking_view(BookingId(booking_id))).await??;
    Ok(Json(view))
}

async fn user_bookings_endpoint(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.service.clone();
    let views = run_blocking(move || {
        // Listing a rider's bookings also settles entries whose date has
        // passed, so views never show a stale PENDING.
        service.complete_elapsed_dates(UserId(user_id), Local::now().date_naive())?;
        service.bookings_for_user(UserId(user_id))
    })
    .await??;
    Ok(Json(views))
}

async fn driver_bookings_endpoint(
    State(state): State<AppState>,
    Path(driver_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.service.clone();
    let views = run_blocking(move || service.bookings_for_driver(DriverId(driver_id))).await??;
    Ok(Json(views))
}

async fn driver_slots_endpoint(
    State(state): State<AppState>,
    Path(driver_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.service.clone();
    let view = run_blocking(move || service.driver_slots(DriverId(driver_id))).await??;
    Ok(Json(view))
}
