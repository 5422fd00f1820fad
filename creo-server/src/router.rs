//! Router construction for the Creo server.

use axum::{
    extract::DefaultBodyLimit,
    http::header,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::downloads::GENERATED_URL_PREFIX;
use crate::handlers::{certificates, files, grades, health, history, tesda, upload};
use crate::state::AppState;

/// Largest accepted request body (uploaded workbooks included).
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Build the full axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let generated = ServeDir::new(&state.config.generated_dir);

    Router::new()
        .route("/", get(health::home))
        .route("/api/ping", get(health::ping))
        // Generation
        .route(
            "/generate/certificates",
            post(certificates::generate_certificates),
        )
        .route(
            "/api/generate-certificates",
            post(certificates::api_generate_certificates),
        )
        .route("/generate/tesda", post(tesda::generate_tesda))
        .route("/api/generate-tesda", post(tesda::api_generate_tesda))
        .route("/api/generate", post(tesda::resave_upload))
        .route("/api/generate/excel", post(grades::generate_excel))
        // Listings and history
        .route("/api/certificates", get(certificates::list_certificates))
        .route("/api/tesda", get(tesda::list_tesda))
        .route(
            "/api/download-history",
            get(history::download_history).post(history::track_download),
        )
        .route("/api/recent-downloads", get(history::recent_downloads))
        // Stored grade files
        .route("/api/generated-files", get(files::list_files))
        .route(
            "/api/generated-files/cleanup-deleted",
            delete(files::cleanup_deleted),
        )
        .route(
            "/api/generated-files/:id",
            get(files::get_file)
                .put(files::update_file)
                .delete(files::delete_file),
        )
        .route(
            "/api/generated-files/:id/soft-delete",
            delete(files::soft_delete_file),
        )
        .route(
            "/api/generated-files/:id/download",
            get(grades::download_file),
        )
        // Uploads
        .route("/upload/excel", post(upload::upload_excel))
        .route("/upload/trainee", post(upload::upload_trainee))
        .nest_service(GENERATED_URL_PREFIX, generated)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
                    .expose_headers([header::CONTENT_DISPOSITION]),
            ),
        )
        .with_state(state)
}
