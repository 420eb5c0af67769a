//! Viewer API endpoints
//!
//! Drives the viewer shell over HTTP:
//! - Select a source by URL, upload or page link
//! - Report viewport width and page turns
//! - Fetch rendered pages
//! - Follow renderer events (server-sent events)

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::viewer::{
    BookControls, BookView, PageRenderError, PendingSource, RenderEvent, ShellSnapshot,
};

/// Uploads are held in memory
const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct SourceRequest {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub href: String,
}

#[derive(Debug, Deserialize)]
pub struct ViewportRequest {
    /// Container width in CSS pixels
    pub width: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigateAction {
    Prev,
    Next,
    Goto,
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub action: NavigateAction,
    /// 0-based target for `goto`
    pub page: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// `data-url` returns the image inline as JSON
    pub format: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDataResponse {
    pub index: usize,
    pub generation: u64,
    pub width: u32,
    pub height: u32,
    pub data_url: String,
}

#[derive(Serialize)]
pub struct PendingPageResponse {
    pub index: usize,
    pub status: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_viewer).delete(clear_viewer))
        .route("/source", post(use_url))
        .route("/upload", post(upload_file))
        .route("/link", post(preselect_from_link))
        .route("/viewport", post(observe_viewport))
        .route("/navigate", post(navigate))
        .route("/pages/:index", get(get_page))
        .route("/events", get(events))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Current viewer state
async fn get_viewer(State(state): State<AppState>) -> Json<ShellSnapshot> {
    Json(state.shell().lock().await.snapshot())
}

/// Select a URL or same-origin path
async fn use_url(
    State(state): State<AppState>,
    Json(request): Json<SourceRequest>,
) -> Result<Json<ShellSnapshot>> {
    let pending = state.shell().lock().await.begin_use_url(&request.url);
    check_and_commit(&state, pending).await
}

/// Probe without holding the shell lock, then commit
async fn check_and_commit(
    state: &AppState,
    pending: Option<PendingSource>,
) -> Result<Json<ShellSnapshot>> {
    let checked = match pending {
        Some(pending) => Some(pending.check().await),
        None => None,
    };

    let mut shell = state.shell().lock().await;
    if let Some(checked) = checked {
        shell.finish_use_url(checked)?;
    }
    Ok(Json(shell.snapshot()))
}

/// Select an uploaded PDF
async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ShellSnapshot>> {
    tracing::debug!("Starting PDF upload processing");

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to read multipart field: {}", e);
        AppError::BadRequest(format!("Failed to read upload: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();
        if name != "file" && name != "pdf" {
            tracing::debug!("Skipping multipart field '{}'", name);
            continue;
        }

        let file_name = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "upload.pdf".to_string());

        let data = field.bytes().await.map_err(|e| {
            tracing::error!("Failed to read file data: {}", e);
            AppError::BadRequest(format!("Failed to read file data: {}", e))
        })?;

        tracing::debug!("Read {} bytes of file data", data.len());
        if data.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
        }

        let mut shell = state.shell().lock().await;
        shell.handle_file(&file_name, data.to_vec());
        return Ok(Json(shell.snapshot()));
    }

    Err(AppError::BadRequest(
        "No file provided. Use field name 'file'".to_string(),
    ))
}

/// Preselect from a page link carrying `?pdf=`
async fn preselect_from_link(
    State(state): State<AppState>,
    Json(request): Json<LinkRequest>,
) -> Result<Json<ShellSnapshot>> {
    let pending = state.shell().lock().await.begin_link(&request.href)?;
    check_and_commit(&state, pending).await
}

/// Record a container width; resizes are debounced
async fn observe_viewport(
    State(state): State<AppState>,
    Json(request): Json<ViewportRequest>,
) -> Result<StatusCode> {
    if !(request.width.is_finite() && request.width > 0.0) {
        return Err(AppError::BadRequest(format!(
            "Invalid container width {}",
            request.width
        )));
    }

    state.viewport().observe(request.width);
    Ok(StatusCode::ACCEPTED)
}

/// Turn pages
async fn navigate(
    State(state): State<AppState>,
    Json(request): Json<NavigateRequest>,
) -> Result<Json<BookView>> {
    let mut shell = state.shell().lock().await;
    let book = shell.book_mut();

    match request.action {
        NavigateAction::Prev => book.flip_prev(),
        NavigateAction::Next => book.flip_next(),
        NavigateAction::Goto => {
            let page = request
                .page
                .ok_or_else(|| AppError::BadRequest("'goto' requires a page".to_string()))?;
            book.turn_to_page(page)
        }
    };

    Ok(Json(book.view()))
}

/// Rendered page image.
///
/// Empty slots answer 202 and get rendered in the background.
async fn get_page(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Query(query): Query<PageQuery>,
) -> Result<Response> {
    let renderer = state.renderer();

    if let Some(page) = renderer.page(index) {
        if query.format.as_deref() == Some("data-url") {
            return Ok(Json(PageDataResponse {
                index,
                generation: page.generation,
                width: page.image.width,
                height: page.image.height,
                data_url: page.image.to_data_url(),
            })
            .into_response());
        }

        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, page.image.mime)
            .header(header::CACHE_CONTROL, "no-store")
            .header("x-page-generation", page.generation.to_string())
            .body(Body::from(page.image.data.clone()))
            .map_err(|e| AppError::Internal(e.to_string()))?;
        return Ok(response);
    }

    let page_count = renderer.page_count().ok_or(PageRenderError::NoDocument)?;
    if index >= page_count {
        return Err(PageRenderError::OutOfRange { index, page_count }.into());
    }

    let renderer = renderer.clone();
    tokio::spawn(async move {
        if let Err(e) = renderer.fill_slot(index).await {
            tracing::debug!("On-demand render of page {} failed: {}", index, e);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(PendingPageResponse {
            index,
            status: "rendering",
        }),
    )
        .into_response())
}

/// Drop the selection
async fn clear_viewer(State(state): State<AppState>) -> StatusCode {
    state.shell().lock().await.teardown();
    StatusCode::NO_CONTENT
}

fn event_name(event: &RenderEvent) -> &'static str {
    match event {
        RenderEvent::Loading { .. } => "loading",
        RenderEvent::Opened { .. } => "opened",
        RenderEvent::SlotFilled { .. } => "slot-filled",
        RenderEvent::SlotFailed { .. } => "slot-failed",
        RenderEvent::PartialReady { .. } => "partial-ready",
        RenderEvent::RenderingMore { .. } => "rendering-more",
        RenderEvent::Ready { .. } => "ready",
        RenderEvent::Failed { .. } => "failed",
        RenderEvent::Cleared { .. } => "cleared",
    }
}

/// Renderer events as server-sent events
async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.renderer().subscribe();

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => match Event::default().event(event_name(&event)).json_data(&event) {
                    Ok(sse) => return Some((Ok(sse), rx)),
                    Err(e) => tracing::warn!("Failed to encode renderer event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event subscriber lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
