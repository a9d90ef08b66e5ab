//! Ragline API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Authentication and authorization
//! - Rate limiting
//! - Chat persistence and the streaming relay to the answering backend
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    extract::FromRef,
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use ragline_common::{
    answerer::AnswerClient,
    auth::JwtManager,
    config::AppConfig,
    db::DbPool,
    errors::AppError,
    metrics,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, Level};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub answerer: AnswerClient,
    pub jwt: Arc<JwtManager>,
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting Ragline API Gateway v{}", ragline_common::VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;

    let config = Arc::new(config);

    // Initialize metrics
    metrics::register_metrics();
    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;

    // HTTP client for the answering backend
    let answerer = AnswerClient::new(&config.backend);

    // JWT validation; tokens are minted by the external auth system
    let jwt_secret = config
        .auth
        .jwt_secret
        .clone()
        .ok_or_else(|| AppError::Configuration {
            message: "auth.jwt_secret must be set".to_string(),
        })?;
    let jwt = Arc::new(JwtManager::new(&jwt_secret, config.auth.jwt_expiration_secs));

    // Create app state
    let state = AppState {
        config: config.clone(),
        db,
        answerer,
        jwt,
    };

    // Build the router
    let app = create_router(state, metrics_handle);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState, metrics_handle: PrometheusHandle) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes (bearer-authenticated via the AuthContext extractor)
    let api_routes = Router::new()
        // Exchange endpoints
        .route("/chat/send", post(handlers::exchange::send))
        .route("/chat/stream", post(handlers::exchange::stream))
        // Chat history endpoints
        .route("/chats", get(handlers::chats::list_chats))
        .route("/chats", post(handlers::chats::create_chat))
        .route("/chats/{id}", get(handlers::chats::get_chat))
        .route("/chats/{id}", delete(handlers::chats::delete_chat))
        .route("/chats/{id}/messages", get(handlers::chats::list_messages))
        .route("/chats/{id}/messages", post(handlers::chats::append_message))
        // Analytics endpoints
        .route("/analytics/log", post(handlers::analytics::log_entry))
        .route("/analytics/summary", get(handlers::analytics::summary))
        // Model catalog
        .route("/models", get(handlers::models::list_models));

    // Rate limiting applies to the API surface only
    let api_routes = if state.config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        api_routes.layer(axum::middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit_middleware,
        ))
    } else {
        api_routes
    };

    // Compose the app
    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(handlers::health::health))
        .route("/health/ready", get(handlers::health::ready))
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
