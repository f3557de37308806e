
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use jobhost::api::{router, ErrorResponse, EVENT_STREAM, SUBSCRIBED};
use jobhost::job::{EventKind, Job, JobConfig, JobEvent, JobStatus};
use test_harness::{insert_job, test_host, wait_for, RecordingBackend};

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_list_jobs_empty() {
    let host = test_host(RecordingBackend::new());

    let response = router(host)
        .oneshot(request(Method::GET, "/host/jobs"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let jobs: Vec<Job> = json_body(response).await;
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn test_list_jobs_returns_every_job() {
    let host = test_host(RecordingBackend::new());
    insert_job(host.store(), "a", JobStatus::Running).await;
    insert_job(host.store(), "b", JobStatus::Stopped).await;

    let response = router(host)
        .oneshot(request(Method::GET, "/host/jobs"))
        .await
        .unwrap();

    let jobs: Vec<Job> = json_body(response).await;
    let ids: Vec<_> = jobs.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(jobs[0].status, JobStatus::Running);
    assert_eq!(jobs[1].status, JobStatus::Stopped);
}

#[tokio::test]
async fn test_get_job() {
    let host = test_host(RecordingBackend::new());
    insert_job(host.store(), "j1", JobStatus::Crashed).await;
    let app = router(host);

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/host/jobs/j1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let job: Job = json_body(response).await;
    assert_eq!(job.id, "j1");
    assert_eq!(job.status, JobStatus::Crashed);
    assert_eq!(job.exit_code, Some(1));

    let response = app
        .oneshot(request(Method::GET, "/host/jobs/missing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: ErrorResponse = json_body(response).await;
    assert!(error.error.contains("missing"));
}

#[tokio::test]
async fn test_delete_starting_job_defers_stop() {
    let backend = RecordingBackend::new();
    let host = test_host(backend.clone());
    insert_job(host.store(), "j1", JobStatus::Starting).await;

    let response = router(host.clone())
        .oneshot(request(Method::DELETE, "/host/jobs/j1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(host.store().get_job("j1").await.unwrap().force_stop);
    assert!(backend.stop_calls().is_empty());
}

#[tokio::test]
async fn test_delete_running_job_calls_backend() {
    let backend = RecordingBackend::new();
    let host = test_host(backend.clone());
    insert_job(host.store(), "j2", JobStatus::Running).await;

    let response = router(host)
        .oneshot(request(Method::DELETE, "/host/jobs/j2"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(backend.stop_calls(), vec!["j2".to_string()]);
}

#[tokio::test]
async fn test_delete_error_statuses() {
    let host = test_host(RecordingBackend::new());
    insert_job(host.store(), "done", JobStatus::Stopped).await;
    let app = router(host);

    let response = app
        .clone()
        .oneshot(request(Method::DELETE, "/host/jobs/done"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let error: ErrorResponse = json_body(response).await;
    assert!(error.error.contains("done"));

    let response = app
        .oneshot(request(Method::DELETE, "/host/jobs/missing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_backend_failure_is_server_error() {
    let host = test_host(RecordingBackend::failing("no such container"));
    insert_job(host.store(), "j2", JobStatus::Running).await;

    let response = router(host)
        .oneshot(request(Method::DELETE, "/host/jobs/j2"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = json_body(response).await;
    assert!(error.error.contains("no such container"));
}

#[tokio::test]
async fn test_put_job() {
    let backend = RecordingBackend::new();
    let host = test_host(backend.clone());
    let app = router(host.clone());

    let put = |uri: &str| {
        Request::builder()
            .method(Method::PUT)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"image": "busybox", "cmd": ["sleep", "1"]}"#))
            .unwrap()
    };

    let response = app.clone().oneshot(put("/host/jobs/web-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let job: Job = json_body(response).await;
    assert_eq!(job.status, JobStatus::Starting);
    assert_eq!(job.config.image.as_deref(), Some("busybox"));
    assert_eq!(backend.start_calls(), vec!["web-1".to_string()]);

    let response = app.clone().oneshot(put("/host/jobs/web-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.oneshot(put("/host/jobs/all")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(host.store().len().await, 1);
}

/// Next body chunk as text, failing the test if none arrives in time.
async fn next_chunk(body: &mut Body) -> String {
    let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
        .await
        .expect("timed out waiting for an event frame")
        .expect("stream ended early")
        .unwrap();
    let data = frame.into_data().expect("data frame");
    String::from_utf8(data.to_vec()).unwrap()
}

/// Read body chunks until `count` complete `data:` frames have arrived.
/// Comment frames are skipped.
async fn read_frames(body: &mut Body, count: usize) -> Vec<JobEvent> {
    let mut text = String::new();
    let mut events = Vec::new();
    while events.len() < count {
        text.push_str(&next_chunk(body).await);
        while let Some(end) = text.find("\n\n") {
            let frame: String = text.drain(..end + 2).collect();
            if let Some(json) = frame.trim_end().strip_prefix("data: ") {
                events.push(serde_json::from_str(json).unwrap());
            }
        }
    }
    events
}

#[tokio::test]
async fn test_event_stream_opens_with_comment() {
    let host = test_host(RecordingBackend::new());

    let response = router(host)
        .oneshot(
            Request::builder()
                .uri("/host/jobs")
                .header(header::ACCEPT, EVENT_STREAM)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Sent before any job event exists
    let mut body = response.into_body();
    let first = next_chunk(&mut body).await;
    assert_eq!(first.as_bytes(), SUBSCRIBED);
}

#[tokio::test]
async fn test_event_stream_delivers_and_cleans_up_on_disconnect() {
    let host = test_host(RecordingBackend::new());
    let registry = host.store().registry().clone();

    let response = router(host.clone())
        .oneshot(
            Request::builder()
                .uri("/host/jobs")
                .header(header::ACCEPT, EVENT_STREAM)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with(EVENT_STREAM));
    assert_eq!(registry.listener_count(), 1);

    host.store()
        .add_job(Job::new("j1", JobConfig::default()))
        .await
        .unwrap();
    assert!(host.store().mark_running("j1").await);

    let mut body = response.into_body();
    let events = read_frames(&mut body, 2).await;
    assert_eq!(events.len(), 2);
    assert_eq!((events[0].event, events[0].job_id.as_str()), (EventKind::Create, "j1"));
    assert_eq!(events[1].event, EventKind::Start);
    assert_eq!(events[1].job.status, JobStatus::Running);

    drop(body);
    let cleaned = wait_for(Duration::from_secs(2), || {
        let registry = registry.clone();
        async move { registry.listener_count() == 0 }
    })
    .await;
    assert!(cleaned, "listener must be removed after the client disconnects");

    // Dispatch after the disconnect completes without blocking
    tokio::time::timeout(
        Duration::from_secs(1),
        host.store().mark_exited("j1", Some(0), false),
    )
    .await
    .expect("dispatch must not block after disconnect");
}

#[tokio::test]
async fn test_job_event_stream_filters_by_id() {
    let host = test_host(RecordingBackend::new());
    insert_job(host.store(), "j1", JobStatus::Starting).await;
    insert_job(host.store(), "j2", JobStatus::Starting).await;

    let response = router(host.clone())
        .oneshot(
            Request::builder()
                .uri("/host/jobs/j2")
                .header(header::ACCEPT, "text/event-stream, */*")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(host.store().mark_running("j1").await);
    assert!(host.store().mark_running("j2").await);

    let mut body = response.into_body();
    let events = read_frames(&mut body, 1).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].job_id, "j2");
    assert_eq!(events[0].event, EventKind::Start);
}
