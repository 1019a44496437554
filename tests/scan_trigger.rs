mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode, header::AUTHORIZATION},
};
use sqlx::{Pool, Postgres};
use tower::ServiceExt;
use uuid::Uuid;

use subwatch::scans::dtos::ScanResponse;

fn trigger_request(token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/scans")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn response_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn count_scan_logs(pool: &Pool<Postgres>, user_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT count(*) FROM scan_logs WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_trigger_requires_authentication() {
    let Some(pool) = helpers::setup_test_db().await else {
        return;
    };
    let app = helpers::test_app(pool);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/scans")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_trigger_creates_running_log_and_queues_the_job() {
    let Some(pool) = helpers::setup_test_db().await else {
        return;
    };
    let (user_id, token) = helpers::create_test_user(&pool).await;
    let app = helpers::test_app(pool.clone());

    let response = app.oneshot(trigger_request(&token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let scan: ScanResponse = response_json(response).await;
    assert!(scan.success);

    let status: String =
        sqlx::query_scalar("SELECT status::text FROM scan_logs WHERE id = $1")
            .bind(scan.scan_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "running");

    let queued: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM jobs WHERE kind = 'scan_mailbox' AND payload->>'scan_log_id' = $1",
    )
    .bind(scan.scan_id.to_string())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(queued, 1);

    assert_eq!(count_scan_logs(&pool, user_id).await, 1);
}

#[tokio::test]
async fn test_second_trigger_returns_existing_scan_and_creates_nothing() {
    let Some(pool) = helpers::setup_test_db().await else {
        return;
    };
    let (user_id, token) = helpers::create_test_user(&pool).await;
    let app = helpers::test_app(pool.clone());

    let first: ScanResponse =
        response_json(app.clone().oneshot(trigger_request(&token)).await.unwrap()).await;
    let second_response = app.oneshot(trigger_request(&token)).await.unwrap();

    // Already-running is reported as success carrying the existing id.
    assert_eq!(second_response.status(), StatusCode::OK);
    let second: ScanResponse = response_json(second_response).await;
    assert!(second.success);
    assert_eq!(second.scan_id, first.scan_id);

    assert_eq!(count_scan_logs(&pool, user_id).await, 1);
}

#[tokio::test]
async fn test_trigger_clears_scanned_rows_but_not_manual_ones() {
    let Some(pool) = helpers::setup_test_db().await else {
        return;
    };
    let (user_id, token) = helpers::create_test_user(&pool).await;

    sqlx::query(
        "INSERT INTO subscriptions (user_id, name, is_manual) VALUES ($1, 'Gym Membership', true)",
    )
    .bind(user_id)
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO subscriptions (user_id, name, is_manual) VALUES ($1, 'Stale Scan Row', false)",
    )
    .bind(user_id)
    .execute(&pool)
    .await
    .unwrap();

    let app = helpers::test_app(pool.clone());
    let response = app.oneshot(trigger_request(&token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let names: Vec<String> =
        sqlx::query_scalar("SELECT name FROM subscriptions WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(names, vec!["Gym Membership"]);
}

#[tokio::test]
async fn test_latest_scan_endpoint() {
    let Some(pool) = helpers::setup_test_db().await else {
        return;
    };
    let (_user_id, token) = helpers::create_test_user(&pool).await;
    let app = helpers::test_app(pool.clone());

    // Nothing scanned yet.
    let request = Request::builder()
        .method("GET")
        .uri("/v1/scans/latest")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let scan: ScanResponse =
        response_json(app.clone().oneshot(trigger_request(&token)).await.unwrap()).await;

    let request = Request::builder()
        .method("GET")
        .uri("/v1/scans/latest")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let latest: serde_json::Value = response_json(response).await;
    assert_eq!(latest["id"], serde_json::json!(scan.scan_id));
    assert_eq!(latest["status"], "running");
}

#[tokio::test]
async fn test_completed_scan_unblocks_the_next_trigger() {
    let Some(pool) = helpers::setup_test_db().await else {
        return;
    };
    let (user_id, token) = helpers::create_test_user(&pool).await;
    let app = helpers::test_app(pool.clone());

    let first: ScanResponse =
        response_json(app.clone().oneshot(trigger_request(&token)).await.unwrap()).await;

    // Finalize the first scan the way the worker would.
    subwatch::repositories::ScanLogRepository::new(pool.clone())
        .mark_completed(first.scan_id, 5, 2)
        .await
        .unwrap();

    let second: ScanResponse =
        response_json(app.oneshot(trigger_request(&token)).await.unwrap()).await;
    assert_ne!(second.scan_id, first.scan_id);
    assert_eq!(count_scan_logs(&pool, user_id).await, 2);

    // Terminal state recorded exactly once, counts preserved.
    let (processed, found): (i32, i32) = sqlx::query_as(
        "SELECT emails_processed, subscriptions_found FROM scan_logs WHERE id = $1",
    )
    .bind(first.scan_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!((processed, found), (5, 2));
    assert!(processed >= found);
}
