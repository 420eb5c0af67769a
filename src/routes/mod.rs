//! Route modules for the Flipbook server

pub mod health;
pub mod pdfs;
pub mod viewer;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let pdf_files = ServeDir::new(state.config().pdf_dir());

    Router::new()
        .nest("/health", health::router())
        .nest("/api/pdfs", pdfs::router())
        .nest("/api/viewer", viewer::router())
        .nest_service("/pdfs", pdf_files)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
