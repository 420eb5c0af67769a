//! Public PDF listing

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use crate::library::{list_public_pdfs, PdfEntry};
use crate::state::AppState;

#[derive(Serialize)]
pub struct PdfListResponse {
    pub pdfs: Vec<PdfEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_pdfs))
}

/// List PDFs in the public directory
async fn list_pdfs(State(state): State<AppState>) -> (StatusCode, Json<PdfListResponse>) {
    let dir = state.config().pdf_dir();

    match list_public_pdfs(&dir).await {
        Ok(pdfs) => (StatusCode::OK, Json(PdfListResponse { pdfs, error: None })),
        Err(e) => {
            tracing::error!("Failed to list PDFs in {}: {}", dir.display(), e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PdfListResponse {
                    pdfs: Vec::new(),
                    error: Some("Failed to list PDFs".to_string()),
                }),
            )
        }
    }
}
