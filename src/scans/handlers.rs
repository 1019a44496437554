use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use crate::{
    app_state::AppState,
    auth::{dtos::ErrorResponse, middleware::AuthenticatedUser},
    jobs::handlers::scan_mailbox::{SCAN_MAILBOX_JOB_KIND, ScanMailboxPayload},
    jobs::repository::JobRepository,
    repositories::ScanStart,
    scans::dtos::ScanResponse,
};

/// Trigger a mailbox scan for the authenticated caller.
///
/// The running-scan check and the log creation are one atomic conditional
/// insert; if a scan is already running the existing id comes back as a
/// success and nothing new is started. Starting a scan deletes the caller's
/// previously scanned subscriptions before the new results are confirmed -
/// the response message says so because the deletion is not reversible.
#[utoipa::path(
    post,
    path = "/v1/scans",
    tag = "scans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Scan accepted (new or already running)", body = ScanResponse),
        (status = 401, description = "Missing or invalid credentials"),
        (status = 500, description = "Scan could not be started")
    )
)]
pub async fn start_scan(
    auth_user: AuthenticatedUser,
    State(state): State<AppState>,
) -> Response {
    let user_id = auth_user.user_id;

    let started = match state.scan_logs.start_scan(user_id).await {
        Ok(ScanStart::AlreadyRunning(existing)) => {
            info!(scan_id = %existing.id, "scan already running, returning existing id");
            return (
                StatusCode::OK,
                Json(ScanResponse {
                    success: true,
                    message: "A scan is already running".to_string(),
                    scan_id: existing.id,
                }),
            )
                .into_response();
        }
        Ok(ScanStart::Started(log)) => log,
        Err(e) => {
            error!(error = %e, "failed to create scan log");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to create scan log".to_string(),
                }),
            )
                .into_response();
        }
    };

    // Clear previous scan results, then hand the pipeline to the worker.
    // Either step failing finalizes the log so the user is not locked out of
    // future scans by a permanently "running" row.
    if let Err(e) = state.subscriptions.clear_scanned(user_id).await {
        error!(error = %e, "failed to clear scanned subscriptions");
        finalize_failed(&state, started.id, "Failed to clear previous results").await;
        return scan_start_failed();
    }

    let payload = ScanMailboxPayload {
        user_id,
        scan_log_id: started.id,
    };
    let payload = match serde_json::to_value(&payload) {
        Ok(value) => value,
        Err(e) => {
            error!(error = %e, "failed to serialize scan payload");
            finalize_failed(&state, started.id, "Failed to schedule scan").await;
            return scan_start_failed();
        }
    };
    // max_attempts = 1: a failed scan is recorded, never re-run automatically.
    match JobRepository::enqueue(&state.db_pool, SCAN_MAILBOX_JOB_KIND, payload, None, Some(1))
        .await
    {
        Ok(job_id) => {
            info!(scan_id = %started.id, job_id = %job_id, "scan enqueued");
            (
                StatusCode::OK,
                Json(ScanResponse {
                    success: true,
                    message: "Email scan started. Previously scanned subscriptions were cleared."
                        .to_string(),
                    scan_id: started.id,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to enqueue scan job");
            finalize_failed(&state, started.id, "Failed to schedule scan").await;
            scan_start_failed()
        }
    }
}

/// The caller's most recent scan, running or finished. The dashboard polls
/// this while a scan is in flight.
#[utoipa::path(
    get,
    path = "/v1/scans/latest",
    tag = "scans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Most recent scan log"),
        (status = 404, description = "User has never scanned"),
        (status = 401, description = "Missing or invalid credentials")
    )
)]
pub async fn latest_scan(
    auth_user: AuthenticatedUser,
    State(state): State<AppState>,
) -> Response {
    match state.scan_logs.latest_for_user(auth_user.user_id).await {
        Ok(Some(log)) => (StatusCode::OK, Json(log)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "No scans yet".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to load latest scan");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Database error".to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn finalize_failed(state: &AppState, scan_log_id: uuid::Uuid, reason: &str) {
    if let Err(e) = state.scan_logs.mark_failed(scan_log_id, reason).await {
        warn!(scan_id = %scan_log_id, error = %e, "failed to finalize scan log");
    }
}

fn scan_start_failed() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Failed to start scan".to_string(),
        }),
    )
        .into_response()
}
