use crate::AppState;
use crate::handlers;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

pub fn build_router(state: AppState) -> Router {
    let public = ServeDir::new(&state.config.public_dir);

    Router::new()
        // Health check
        .route("/health", get(handlers::health::health_check))

        // Link store
        .route(
            "/api/data",
            get(handlers::data::get_data).post(handlers::data::post_data),
        )

        // Collaborators of the UI
        .route("/api/upload", post(handlers::upload::upload_file))
        .route("/api/health-proxy", get(handlers::health_proxy::health_proxy))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))

        // Static files, uploads included
        .fallback_service(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
