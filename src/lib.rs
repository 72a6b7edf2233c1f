//! Newsdesk Backend - library for app logic and testing
//!
//! Content backend for a Korean news portal: article CRUD, a key-value
//! settings store over four interchangeable backends, cookie-based admin
//! auth with login rate limiting, audit logs, syndication feeds, and
//! scheduled publishing.

pub mod auth;
pub mod logging;
pub mod ratelimit;
pub mod routes;
pub mod settings;
pub mod state;
pub mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

use state::AppState;

/// Configure CORS from environment variables.
/// Uses ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN.
/// Falls back to localhost dev origins.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .and_then(|s| {
            let origins: Vec<HeaderValue> = s
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                None
            } else {
                Some(origins)
            }
        })
        .or_else(|| {
            std::env::var("FRONTEND_ORIGIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(|| {
            vec![
                "http://localhost:3000".parse().expect("static origin"),
                "http://127.0.0.1:3000".parse().expect("static origin"),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

/// Create and configure the application router.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = configure_cors();

    Router::new()
        .route(
            "/api/auth/login",
            post(routes::auth::login).delete(routes::auth::logout),
        )
        .route("/api/auth/me", get(routes::auth::me))
        .route(
            "/api/db/articles",
            get(routes::articles::list_articles)
                .post(routes::articles::create_article)
                .patch(routes::articles::update_article)
                .delete(routes::articles::delete_article),
        )
        .route(
            "/api/db/articles/views",
            post(routes::articles::increment_views),
        )
        .route(
            "/api/db/settings",
            get(routes::settings::get_setting).put(routes::settings::save_setting),
        )
        .route(
            "/api/db/view-logs",
            get(routes::logs::view_logs).post(routes::logs::add_view_log),
        )
        .route(
            "/api/db/distribute-logs",
            get(routes::logs::distribute_logs)
                .post(routes::logs::add_distribute_logs)
                .delete(routes::logs::clear_distribute_logs),
        )
        .route(
            "/api/db/comments",
            get(routes::comments::list_comments)
                .post(routes::comments::create_comment)
                .patch(routes::comments::moderate_comment)
                .delete(routes::comments::delete_comment),
        )
        .route(
            "/api/db/newsletter",
            get(routes::newsletter::list_subscribers)
                .post(routes::newsletter::subscribe)
                .delete(routes::newsletter::unsubscribe_by_email),
        )
        .route(
            "/api/newsletter/unsubscribe",
            get(routes::newsletter::unsubscribe_by_token),
        )
        .route("/api/rss", get(routes::feeds::rss))
        .route("/atom.xml", get(routes::feeds::atom))
        .route("/feed.json", get(routes::feeds::json_feed))
        .route(
            "/api/cron/publish",
            get(routes::cron::publish_scheduled).post(routes::cron::publish_scheduled),
        )
        .route("/health", get(routes::health::health_ping))
        .route("/health/detailed", get(routes::health::health_detailed))
        .with_state(state)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        // Compress responses with gzip/br/zstd automatically
        .layer(CompressionLayer::new())
        // Global 2 MB request body cap — article HTML stays well under it
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024))
        .layer(cors)
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    // Guards MUST be held for the process lifetime; dropping them early
    // shuts down background log-writer threads and loses buffered lines.
    let _log_guards = logging::init();

    routes::health::init_start_time();

    // Refuse to start in production with the insecure default cookie secret.
    let environment = std::env::var("ENVIRONMENT").unwrap_or_default();
    if environment == "production" {
        let secret = std::env::var("COOKIE_SECRET").unwrap_or_default();
        if secret.is_empty() || secret == auth::DEFAULT_COOKIE_SECRET {
            panic!(
                "FATAL: COOKIE_SECRET must be set to a secure, unique value in production. \
                 Refusing to start with the default secret."
            );
        }
        if std::env::var("PASSWORD_SALT").unwrap_or_default().is_empty() {
            tracing::warn!(
                "SECURITY: PASSWORD_SALT is not set; password hashes use the built-in \
                 default salt. Set a strong random value before creating accounts."
            );
        }
    }

    let state = AppState::from_env().await;
    let app = create_app(state);

    // Bind address is configurable via HOST / PORT env vars.
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3002);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid HOST/PORT configuration");
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
