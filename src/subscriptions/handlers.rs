use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;
use uuid::Uuid;

use crate::{
    app_state::AppState,
    auth::{dtos::ErrorResponse, middleware::AuthenticatedUser},
    repositories::NewSubscription,
    repositories::subscription::SubscriptionChanges,
    subscriptions::dtos::{CreateSubscriptionRequest, UpdateSubscriptionRequest},
};

#[utoipa::path(
    get,
    path = "/v1/subscriptions",
    tag = "subscriptions",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "The caller's subscriptions, newest first"),
        (status = 401, description = "Missing or invalid credentials")
    )
)]
pub async fn list_subscriptions(
    auth_user: AuthenticatedUser,
    State(state): State<AppState>,
) -> Response {
    match state.subscriptions.list_for_user(auth_user.user_id).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(e) => {
            error!(error = %e, "failed to list subscriptions");
            database_error()
        }
    }
}

/// Create a manual entry. Manual rows are user data: the scan pipeline never
/// clears or overwrites them.
#[utoipa::path(
    post,
    path = "/v1/subscriptions",
    tag = "subscriptions",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Subscription created"),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "A subscription with this name already exists")
    )
)]
pub async fn create_subscription(
    auth_user: AuthenticatedUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> Response {
    if let Err(error) = payload.validate() {
        return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response();
    }

    let row = NewSubscription {
        name: payload.name.trim().to_string(),
        organization_id: None,
        cost: payload.cost,
        billing_frequency: payload.billing_frequency,
        category: payload.category,
        next_billing_date: payload.next_billing_date,
        status: payload.status.unwrap_or_else(|| "active".to_string()),
        is_pending_review: false,
        email_source: None,
    };

    match state.subscriptions.create_manual(auth_user.user_id, &row).await {
        Ok(subscription) => (StatusCode::CREATED, Json(subscription)).into_response(),
        Err(e) => {
            // (user_id, name) is unique; a duplicate manual entry is a
            // conflict, not a server fault.
            if e.downcast_ref::<sqlx::Error>()
                .and_then(|db| db.as_database_error())
                .is_some_and(|db| db.is_unique_violation())
            {
                return (
                    StatusCode::CONFLICT,
                    Json(ErrorResponse {
                        error: "A subscription with this name already exists".to_string(),
                    }),
                )
                    .into_response();
            }
            error!(error = %e, "failed to create subscription");
            database_error()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/v1/subscriptions/{id}",
    tag = "subscriptions",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Updated subscription"),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "No such subscription for this user")
    )
)]
pub async fn update_subscription(
    auth_user: AuthenticatedUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSubscriptionRequest>,
) -> Response {
    if let Err(error) = payload.validate() {
        return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response();
    }

    let changes = SubscriptionChanges {
        name: payload.name.map(|n| n.trim().to_string()),
        cost: payload.cost,
        billing_frequency: payload.billing_frequency,
        category: payload.category,
        next_billing_date: payload.next_billing_date,
        status: payload.status,
        is_pending_review: payload.is_pending_review,
    };

    match state
        .subscriptions
        .update(auth_user.user_id, id, &changes)
        .await
    {
        Ok(Some(subscription)) => (StatusCode::OK, Json(subscription)).into_response(),
        Ok(None) => not_found(),
        Err(e) => {
            error!(error = %e, "failed to update subscription");
            database_error()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/v1/subscriptions/{id}",
    tag = "subscriptions",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such subscription for this user")
    )
)]
pub async fn delete_subscription(
    auth_user: AuthenticatedUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.subscriptions.delete(auth_user.user_id, id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(),
        Err(e) => {
            error!(error = %e, "failed to delete subscription");
            database_error()
        }
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "Subscription not found".to_string(),
        }),
    )
        .into_response()
}

fn database_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Database error".to_string(),
        }),
    )
        .into_response()
}
