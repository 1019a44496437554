#![allow(dead_code)]

use axum::{
    Router,
    routing::{get, post},
};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use subwatch::{
    app_state::AppState,
    auth::{self, jwt::JwtService},
    config::Config,
    scans, subscriptions,
};

/// Full API router minus the rate limiter (tests drive it with oneshot and
/// have no peer address).
pub fn test_app(pool: Pool<Postgres>) -> Router {
    let state = AppState::new(pool);

    Router::new()
        .route("/v1/auth/signup", post(auth::handlers::signup))
        .route("/v1/auth/login", post(auth::handlers::login))
        .route("/v1/scans", post(scans::handlers::start_scan))
        .route("/v1/scans/latest", get(scans::handlers::latest_scan))
        .route(
            "/v1/subscriptions",
            get(subscriptions::handlers::list_subscriptions)
                .post(subscriptions::handlers::create_subscription),
        )
        .route(
            "/v1/subscriptions/{id}",
            axum::routing::patch(subscriptions::handlers::update_subscription)
                .delete(subscriptions::handlers::delete_subscription),
        )
        .with_state(state)
}

/// Connect to `TEST_DATABASE_URL` and run migrations, or `None` to skip the
/// test when no database is configured.
pub async fn setup_test_db() -> Option<Pool<Postgres>> {
    let database_url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping database test: TEST_DATABASE_URL not set");
            return None;
        }
    };

    let pool = Pool::connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    Some(pool)
}

/// Insert a user with a unique email; returns the id and a valid token.
pub async fn create_test_user(pool: &Pool<Postgres>) -> (Uuid, String) {
    let user_id = Uuid::new_v4();
    let email = format!("user-{user_id}@example.com");
    sqlx::query("INSERT INTO users (id, email, pw_hash) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(&email)
        .bind("dummy_hash")
        .execute(pool)
        .await
        .expect("Failed to insert test user");

    (user_id, jwt_for(user_id))
}

pub fn jwt_for(user_id: Uuid) -> String {
    let config = Config::from_env().expect("Failed to load config");
    JwtService::new(config.jwt_secret())
        .generate_token(user_id)
        .expect("Failed to generate token")
}
