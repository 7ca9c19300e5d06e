//! Workflow API Integration Tests

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use gym_buddy::actors::session::CoachSettings;
use gym_buddy::api;
use gym_buddy::app_state::{AppState, AppStateConfig};
use gym_buddy::db;
use gym_buddy::inference::CannedCoachProvider;

async fn setup_test_app(answer_wait: Duration) -> axum::Router {
    let pool = db::connect_in_memory().await.expect("Failed to open database");
    let app_state = AppState::spawn(
        pool,
        Arc::new(CannedCoachProvider),
        AppStateConfig {
            model: "@cf/test/coach".to_string(),
            coach: CoachSettings::default(),
            interview_answer_wait: answer_wait,
        },
    )
    .await
    .expect("Failed to start actor system");

    api::router().with_state(api::ApiState {
        app_state: Arc::new(app_state),
    })
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(req).await.expect("Request failed");
    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    (status, body.to_vec())
}

async fn json_response(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, req).await;
    (status, serde_json::from_slice(&body).expect("Invalid JSON response"))
}

fn start_workflow_request(body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/start-workflow")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get_workflow_request(run_id: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/api/workflows/{run_id}"))
        .body(Body::empty())
        .unwrap()
}

async fn wait_for_status(app: &axum::Router, run_id: &str, status: &str) -> Value {
    for _ in 0..200 {
        let (code, record) = json_response(app, get_workflow_request(run_id)).await;
        assert_eq!(code, StatusCode::OK);
        if record["status"] == status {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {run_id} never reached {status}");
}

#[tokio::test]
async fn test_start_workflow_runs_to_completion() {
    let app = setup_test_app(Duration::from_millis(20)).await;

    let (status, started) = json_response(&app, start_workflow_request(r#"{"role":"rust"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["status"], "started");
    let run_id = started["workflow"].as_str().unwrap().to_string();
    assert!(!run_id.is_empty());

    let record = wait_for_status(&app, &run_id, "completed").await;
    assert_eq!(record["workflow"], "interview");
    assert_eq!(record["params"], json!({"role": "rust"}));
    assert_eq!(
        record["output"],
        json!({"score": 4, "pros": "Clear structure", "cons": "Could be more specific"})
    );

    let steps = record["steps"].as_array().unwrap();
    let names: Vec<_> = steps.iter().map(|s| s["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["generate question", "wait for answer", "evaluate", "persist"]);
    assert_eq!(
        steps[0]["output"],
        "What's a recent project where you used rust skills?"
    );
}

#[tokio::test]
async fn test_start_workflow_with_unreadable_body_uses_default_role() {
    let app = setup_test_app(Duration::from_secs(3600)).await;

    for body in ["", "not json", "{}", r#"{"role":""}"#] {
        let (status, started) = json_response(&app, start_workflow_request(body)).await;
        assert_eq!(status, StatusCode::OK, "body {body:?}");

        let run_id = started["workflow"].as_str().unwrap();
        let record = wait_for_status(&app, run_id, "running").await;
        assert_eq!(record["params"], json!({"role": "software"}));
    }
}

#[tokio::test]
async fn test_unknown_run_is_404() {
    let app = setup_test_app(Duration::from_millis(10)).await;

    let (status, body) = send(&app, get_workflow_request("01NOTAREALRUN")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, b"Not found");
}

#[tokio::test]
async fn test_start_workflow_requires_post() {
    let app = setup_test_app(Duration::from_millis(10)).await;

    let req = Request::builder()
        .uri("/api/start-workflow")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, b"Not found");
}
