use anyhow::Result;
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::net::SocketAddr;
use subwatch::{
    app_state::AppState,
    auth, config, health,
    middleware::{RateLimit, rate_limit_middleware},
    scans, subscriptions,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        subwatch::health::health_check,
        subwatch::scans::handlers::start_scan,
        subwatch::scans::handlers::latest_scan,
        subwatch::subscriptions::handlers::list_subscriptions,
        subwatch::subscriptions::handlers::create_subscription,
        subwatch::subscriptions::handlers::update_subscription,
        subwatch::subscriptions::handlers::delete_subscription,
    ),
    components(schemas(
        subwatch::entities::ScanLog,
        subwatch::entities::Subscription,
        subwatch::scans::dtos::ScanResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Service health"),
        (name = "scans", description = "Mailbox scan trigger and status"),
        (name = "subscriptions", description = "Subscription CRUD"),
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration
    let config = config::Config::from_env()?;

    // Create database connection pool
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(config.database_url())
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    let state = AppState::new(pool);
    let rate_limit = RateLimit::new(120, 60);

    let app = Router::new()
        .route("/healthz", get(health::health_check))
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
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(from_fn_with_state(rate_limit, rate_limit_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!(addr = config.bind_addr(), "API server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
