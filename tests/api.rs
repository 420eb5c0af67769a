//! HTTP API tests

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use serde_json::{json, Value};
use tower::ServiceExt;

use flipbook_server::config::Config;
use flipbook_server::fetch::SourceFetcher;
use flipbook_server::object_url::ObjectUrlStore;
use flipbook_server::probe::HttpProbe;
use flipbook_server::raster::{DocumentHandle, PageSize, RasterBuffer, RasterError, Rasterizer};
use flipbook_server::routes;
use flipbook_server::state::AppState;

/// Opens "pages=N" as an N-page document of blank letter pages
struct BlankRasterizer;

struct BlankDocument {
    pages: usize,
}

#[async_trait]
impl Rasterizer for BlankRasterizer {
    fn name(&self) -> &'static str {
        "blank"
    }

    async fn open(&self, data: Arc<Vec<u8>>) -> Result<Arc<dyn DocumentHandle>, RasterError> {
        let text = String::from_utf8_lossy(&data);
        let pages = text
            .trim()
            .strip_prefix("pages=")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| RasterError::Open("not a PDF".to_string()))?;
        Ok(Arc::new(BlankDocument { pages }))
    }
}

#[async_trait]
impl DocumentHandle for BlankDocument {
    fn page_count(&self) -> usize {
        self.pages
    }

    async fn page_size(&self, index: usize) -> Result<PageSize, RasterError> {
        if index >= self.pages {
            return Err(RasterError::PageNotFound(index));
        }
        Ok(PageSize {
            width: 612.0,
            height: 792.0,
        })
    }

    async fn render(&self, _index: usize, scale: f32) -> Result<RasterBuffer, RasterError> {
        let width = (612.0 * scale).round() as u32;
        let height = (792.0 * scale).round() as u32;
        Ok(RasterBuffer {
            width,
            height,
            pixels: vec![255; (width * height * 4) as usize],
        })
    }
}

fn app_for(public_dir: &Path) -> axum::Router {
    let mut config = Config::default();
    config.public.dir = public_dir.to_path_buf();

    let objects = ObjectUrlStore::new();
    let fetcher = SourceFetcher::new(
        objects.clone(),
        public_dir,
        None,
        Duration::from_secs(5),
    )
    .unwrap();
    let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();

    let state = AppState::with_parts(
        config,
        objects,
        Arc::new(fetcher),
        Arc::new(probe),
        Arc::new(BlankRasterizer),
    )
    .unwrap();

    routes::app(state)
}

fn server_for(public_dir: &Path) -> TestServer {
    TestServer::new(app_for(public_dir)).unwrap()
}

/// Poll the viewer until `done` accepts its snapshot
async fn wait_until(server: &TestServer, done: impl Fn(&Value) -> bool) -> Value {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let snapshot: Value = server.get("/api/viewer").await.json();
            if done(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("viewer never reached the expected state")
}

async fn wait_for_phase(server: &TestServer, phase: &str) -> Value {
    wait_until(server, |snapshot| snapshot["renderer"]["phase"] == phase).await
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let server = server_for(dir.path());

    let response = server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "healthy");
}

#[tokio::test]
async fn test_lists_public_pdfs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("pdfs")).unwrap();
    std::fs::write(dir.path().join("pdfs/a.pdf"), b"pages=1").unwrap();
    std::fs::write(dir.path().join("pdfs/notes.txt"), b"hello").unwrap();

    let response = app_for(dir.path())
        .oneshot(Request::get("/api/pdfs").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body, json!({ "pdfs": [{ "name": "a.pdf", "url": "/pdfs/a.pdf" }] }));
}

#[tokio::test]
async fn test_missing_pdf_dir_lists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let server = server_for(dir.path());

    let response = server.get("/api/pdfs").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), json!({ "pdfs": [] }));
}

#[tokio::test]
async fn test_unreadable_pdf_dir_is_500() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("pdfs"), b"not a directory").unwrap();
    let server = server_for(dir.path());

    let response = server.get("/api/pdfs").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.json::<Value>(),
        json!({ "pdfs": [], "error": "Failed to list PDFs" })
    );
}

#[tokio::test]
async fn test_serves_public_pdfs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("pdfs")).unwrap();
    std::fs::write(dir.path().join("pdfs/a.pdf"), b"pages=2").unwrap();
    let server = server_for(dir.path());

    let response = server.get("/pdfs/a.pdf").await;
    response.assert_status_ok();
    assert_eq!(response.text(), "pages=2");
}

#[tokio::test]
async fn test_rejects_disallowed_source() {
    let dir = tempfile::tempdir().unwrap();
    let server = server_for(dir.path());

    let response = server
        .post("/api/viewer/source")
        .json(&json!({ "url": "ftp://x.pdf" }))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["error"], "invalid_source");

    let snapshot: Value = server.get("/api/viewer").await.json();
    assert_eq!(snapshot["selected"], Value::Null);
    assert!(snapshot["error"].is_string());
}

#[tokio::test]
async fn test_unreachable_url_is_not_selected() {
    let dir = tempfile::tempdir().unwrap();
    let server = server_for(dir.path());

    // Reserve a port, then close it
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let response = server
        .post("/api/viewer/source")
        .json(&json!({ "url": format!("http://{}/x.pdf", addr) }))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let body: Value = response.json();
    assert_eq!(body["error"], "unreachable_source");
    assert_eq!(
        body["message"],
        "PDF URL is unreachable or blocked by cross-origin policy"
    );

    let snapshot: Value = server.get("/api/viewer").await.json();
    assert_eq!(snapshot["selected"], Value::Null);
    assert_eq!(snapshot["renderer"]["phase"], "idle");
    assert_eq!(snapshot["renderer"]["generation"], 0);
}

#[tokio::test]
async fn test_snapshot_served_while_source_is_probed() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_for(dir.path());

    // Accepts connections but never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stalled = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let url = format!("http://{}/slow.pdf", addr);
    let select = tokio::spawn(
        app.clone().oneshot(
            Request::post("/api/viewer/source")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "url": url }).to_string()))
                .unwrap(),
        ),
    );
    tokio::time::sleep(Duration::from_millis(200)).await;

    let response = tokio::time::timeout(
        Duration::from_secs(1),
        app.oneshot(Request::get("/api/viewer").body(Body::empty()).unwrap()),
    )
    .await
    .expect("snapshot waited on the pending probe")
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let snapshot: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(snapshot["input"], url);
    assert_eq!(snapshot["selected"], Value::Null);

    select.abort();
    stalled.abort();
}

#[tokio::test]
async fn test_upload_renders_progressively() {
    let dir = tempfile::tempdir().unwrap();
    let server = server_for(dir.path());

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(b"pages=10".to_vec())
            .file_name("book.pdf")
            .mime_type("application/pdf"),
    );
    let response = server.post("/api/viewer/upload").multipart(form).await;
    response.assert_status_ok();

    let uploaded: Value = response.json();
    assert!(uploaded["selected"].as_str().unwrap().starts_with("blob:"));
    assert_eq!(uploaded["link"], Value::Null);

    let snapshot = wait_for_phase(&server, "partial-ready").await;
    assert_eq!(snapshot["renderer"]["pageCount"], 10);
    assert_eq!(
        snapshot["renderer"]["filled"],
        json!([true, true, true, true, false, false, false, false, false, false])
    );

    let page = server.get("/api/viewer/pages/0").await;
    page.assert_status_ok();
    assert_eq!(page.header("content-type"), "image/jpeg");

    let inline: Value = server
        .get("/api/viewer/pages/1")
        .add_query_param("format", "data-url")
        .await
        .json();
    assert!(inline["dataUrl"]
        .as_str()
        .unwrap()
        .starts_with("data:image/jpeg;base64,"));

    // Page 9 is outside the window; asking for it schedules a render
    let pending = server.get("/api/viewer/pages/9").await;
    pending.assert_status(StatusCode::ACCEPTED);

    let missing = server.get("/api/viewer/pages/10").await;
    missing.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_navigation_fills_window() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("pdfs")).unwrap();
    std::fs::write(dir.path().join("pdfs/a.pdf"), b"pages=12").unwrap();
    let server = server_for(dir.path());

    server
        .post("/api/viewer/source")
        .json(&json!({ "url": "/pdfs/a.pdf" }))
        .await
        .assert_status_ok();
    wait_for_phase(&server, "partial-ready").await;

    let view: Value = server
        .post("/api/viewer/navigate")
        .json(&json!({ "action": "goto", "page": 6 }))
        .await
        .json();
    assert_eq!(view["currentPage"], 5);
    assert_eq!(view["visible"], json!([5, 6]));

    // Eager pages 0..=3 plus the window 3..=8 around page 5
    let snapshot = wait_until(&server, |snapshot| {
        snapshot["renderer"]["filled"]
            .as_array()
            .map_or(false, |filled| filled[..=8].iter().all(|f| f.as_bool() == Some(true)))
    })
    .await;
    assert_eq!(snapshot["renderer"]["readPosition"], 5);
    assert_eq!(snapshot["renderer"]["filled"][9], false);

    server
        .post("/api/viewer/navigate")
        .json(&json!({ "action": "goto" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_preselect_from_link() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("pdfs")).unwrap();
    std::fs::write(dir.path().join("pdfs/a.pdf"), b"pages=3").unwrap();
    let server = server_for(dir.path());

    let response = server
        .post("/api/viewer/link")
        .json(&json!({ "href": "http://localhost:3000/?pdf=a.pdf" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["selected"], "/pdfs/a.pdf");

    let snapshot = wait_for_phase(&server, "ready").await;
    assert_eq!(snapshot["renderer"]["filled"], json!([true, true, true]));
    assert_eq!(snapshot["book"]["mode"], "spread");
}

#[tokio::test]
async fn test_corrupt_document_reports_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("pdfs")).unwrap();
    std::fs::write(dir.path().join("pdfs/bad.pdf"), b"garbage").unwrap();
    let server = server_for(dir.path());

    server
        .post("/api/viewer/source")
        .json(&json!({ "url": "/pdfs/bad.pdf" }))
        .await
        .assert_status_ok();

    let snapshot = wait_for_phase(&server, "error").await;
    assert_eq!(snapshot["renderer"]["filled"], json!([]));
    assert!(snapshot["renderer"]["error"]
        .as_str()
        .unwrap()
        .starts_with("Failed to render PDF"));
}

#[tokio::test]
async fn test_page_without_document_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let server = server_for(dir.path());

    server
        .get("/api/viewer/pages/0")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_clear_viewer() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("pdfs")).unwrap();
    std::fs::write(dir.path().join("pdfs/a.pdf"), b"pages=2").unwrap();
    let server = server_for(dir.path());

    server
        .post("/api/viewer/source")
        .json(&json!({ "url": "/pdfs/a.pdf" }))
        .await
        .assert_status_ok();

    server
        .delete("/api/viewer")
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let snapshot: Value = server.get("/api/viewer").await.json();
    assert_eq!(snapshot["selected"], Value::Null);
    assert_eq!(snapshot["renderer"]["phase"], "idle");
}
