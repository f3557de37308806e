//! HTTP API of the host.
//!
//! | Route                     | Behavior                                        |
//! |---------------------------|-------------------------------------------------|
//! | `GET /host/jobs`          | all jobs, or an event stream of every job       |
//! | `GET /host/jobs/{id}`     | one job, or an event stream of that job         |
//! | `PUT /host/jobs/{id}`     | register and start a job                        |
//! | `DELETE /host/jobs/{id}`  | stop a job                                      |
//!
//! A `GET` whose `Accept` header contains `text/event-stream` is answered
//! with server-sent events, one JSON [`JobEvent`](crate::job::JobEvent) per
//! frame.

pub mod error;
pub mod sse;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::HostError;
use crate::events::ALL_JOBS;
use crate::host::Host;
use crate::job::JobConfig;

pub use error::ErrorResponse;
pub use sse::{stream_events, wants_event_stream, BodySink, EVENT_STREAM, SUBSCRIBED};

pub fn router(host: Arc<Host>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/host/jobs", get(list_jobs))
        .route(
            "/host/jobs/{id}",
            get(get_job).put(add_job).delete(stop_job),
        )
        .layer(cors)
        .with_state(host)
}

/// Serve the API until `shutdown` is cancelled.
pub async fn run_api(
    addr: SocketAddr,
    host: Arc<Host>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to bind host API");
        e
    })?;

    tracing::info!(addr = %addr, "Starting host API");

    // Graceful shutdown waits on open event streams; closing every listener ends them.
    let registry = host.store().registry().clone();
    let signal = async move {
        shutdown.cancelled().await;
        registry.close_all();
    };

    axum::serve(listener, router(host))
        .with_graceful_shutdown(signal)
        .await
}

async fn list_jobs(State(host): State<Arc<Host>>, headers: HeaderMap) -> Response {
    if wants_event_stream(&headers) {
        return stream_events(&host, ALL_JOBS);
    }

    Json(host.store().list().await).into_response()
}

async fn get_job(
    State(host): State<Arc<Host>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, HostError> {
    if wants_event_stream(&headers) {
        return Ok(stream_events(&host, &id));
    }

    let job = host
        .store()
        .get_job(&id)
        .await
        .ok_or_else(|| HostError::UnknownJob(id.clone()))?;
    Ok(Json(job).into_response())
}

async fn add_job(
    State(host): State<Arc<Host>>,
    Path(id): Path<String>,
    Json(config): Json<JobConfig>,
) -> Result<Response, HostError> {
    let job = host.add_job(&id, config).await?;
    Ok(Json(job).into_response())
}

async fn stop_job(
    State(host): State<Arc<Host>>,
    Path(id): Path<String>,
) -> Result<StatusCode, HostError> {
    host.stop_job(&id).await?;
    Ok(StatusCode::OK)
}
