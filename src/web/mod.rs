//! HTTP surface: the upload form, a JSON API and a health probe.

mod page;
mod server;

use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::error::JobError;
use crate::job::{Conversion, JobOrchestrator, Upload};

pub use server::{WebServer, shutdown_signal};

/// Multipart field carrying the PDF.
pub const UPLOAD_FIELD: &str = "pdf_file";

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
}

/// Build the application router.
pub fn routes(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(form_page).post(convert_form))
        .route("/api/convert", post(convert_api))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ConvertResponse {
    wikitext: String,
    filename: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// A failed request, rendered as JSON or HTML by the caller.
#[derive(Debug)]
struct RequestError {
    status: StatusCode,
    message: String,
}

impl From<JobError> for RequestError {
    fn from(e: JobError) -> Self {
        Self {
            status: status_for(&e),
            message: e.to_string(),
        }
    }
}

impl From<MultipartError> for RequestError {
    fn from(e: MultipartError) -> Self {
        Self {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl From<MultipartRejection> for RequestError {
    fn from(e: MultipartRejection) -> Self {
        Self {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// HTTP status for each job failure kind.
pub fn status_for(error: &JobError) -> StatusCode {
    match error {
        JobError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        JobError::SandboxUnavailable { .. } | JobError::ConversionFailed { .. } => {
            StatusCode::BAD_GATEWAY
        }
        JobError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        JobError::ResultMissing { .. } | JobError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn form_page() -> Html<String> {
    Html(page::render(None))
}

async fn convert_form(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    match convert(&state, multipart).await {
        Ok(conversion) => {
            Html(page::render(Some(Ok(conversion.wikitext.as_str())))).into_response()
        }
        Err(e) => {
            let html = page::render(Some(Err(e.message.as_str())));
            (e.status, Html(html)).into_response()
        }
    }
}

async fn convert_api(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ConvertResponse>, RequestError> {
    let conversion = convert(&state, multipart).await?;
    Ok(Json(ConvertResponse {
        filename: conversion.result_name(),
        wikitext: conversion.wikitext,
    }))
}

async fn convert(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Conversion, RequestError> {
    let upload = read_upload(multipart?).await?;

    // Detached so a disconnecting client cannot interrupt teardown.
    let orchestrator = Arc::clone(&state.orchestrator);
    let job = tokio::spawn(async move { orchestrator.handle(upload).await });

    match job.await {
        Ok(result) => Ok(result?),
        Err(e) => Err(JobError::Internal {
            reason: format!("job task failed: {}", e),
        }
        .into()),
    }
}

/// Pull the [`UPLOAD_FIELD`] part out of the form, ignoring other fields.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, RequestError> {
    let mut upload = Upload::default();

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        // Browsers send an empty filename when nothing was chosen.
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        upload.filename = Some(filename);
        upload.bytes = bytes;
    }

    Ok(upload)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use super::*;
    use crate::config::JobConfig;
    use crate::job::SafeFilename;
    use crate::sandbox::{SandboxError, SandboxOutput, SandboxRunner};

    const BOUNDARY: &str = "pdf2wiki-test-boundary";

    enum Behaviour {
        Convert(&'static str),
        Fail,
        Timeout,
    }

    struct FakeSandbox(Behaviour);

    #[async_trait]
    impl SandboxRunner for FakeSandbox {
        async fn run(
            &self,
            workspace: &Path,
            input: &SafeFilename,
        ) -> crate::sandbox::Result<SandboxOutput> {
            match self.0 {
                Behaviour::Convert(text) => {
                    tokio::fs::write(workspace.join(input.result_name()), text).await?;
                    Ok(SandboxOutput::default())
                }
                Behaviour::Fail => Err(SandboxError::WorkerFailed {
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: "Markdown extraction failed: not a PDF".to_string(),
                }),
                Behaviour::Timeout => Err(SandboxError::Timeout(Duration::from_secs(300))),
            }
        }
    }

    fn app(behaviour: Behaviour, root: &Path, limit: usize) -> Router {
        let orchestrator = JobOrchestrator::new(
            Arc::new(FakeSandbox(behaviour)),
            JobConfig {
                workspace_root: root.to_path_buf(),
            },
        );
        routes(
            AppState {
                orchestrator: Arc::new(orchestrator),
            },
            limit,
        )
    }

    fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: application/pdf\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        serde_json::from_str(&body_string(resp).await).unwrap()
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let root = tempfile::tempdir().unwrap();
        let resp = app(Behaviour::Fail, root.path(), 1024)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!({"status": "healthy"}));
    }

    #[tokio::test]
    async fn api_returns_wikitext_and_result_name() {
        let root = tempfile::tempdir().unwrap();
        let resp = app(Behaviour::Convert("== Intro ==\n"), root.path(), 1 << 20)
            .oneshot(upload_request(
                "/api/convert",
                multipart_body(UPLOAD_FIELD, "My Report.pdf", b"%PDF-1.4"),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({
                "wikitext": "== Intro ==\n",
                "filename": "My_Report_wikitext.txt",
            })
        );
        assert!(dir_is_empty(root.path()));
    }

    #[tokio::test]
    async fn api_rejects_wrong_extension() {
        let root = tempfile::tempdir().unwrap();
        let resp = app(Behaviour::Convert("x"), root.path(), 1 << 20)
            .oneshot(upload_request(
                "/api/convert",
                multipart_body(UPLOAD_FIELD, "notes.txt", b"hello"),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("Invalid file type"));
        assert!(dir_is_empty(root.path()));
    }

    #[tokio::test]
    async fn api_reports_missing_file_part() {
        let root = tempfile::tempdir().unwrap();
        let resp = app(Behaviour::Convert("x"), root.path(), 1 << 20)
            .oneshot(upload_request(
                "/api/convert",
                multipart_body("something_else", "a.pdf", b"%PDF"),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("No file part"));
    }

    #[tokio::test]
    async fn api_reports_empty_selection() {
        let root = tempfile::tempdir().unwrap();
        let resp = app(Behaviour::Convert("x"), root.path(), 1 << 20)
            .oneshot(upload_request(
                "/api/convert",
                multipart_body(UPLOAD_FIELD, "", b""),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("No file selected"));
    }

    #[tokio::test]
    async fn worker_failure_is_bad_gateway_with_diagnostic() {
        let root = tempfile::tempdir().unwrap();
        let resp = app(Behaviour::Fail, root.path(), 1 << 20)
            .oneshot(upload_request(
                "/api/convert",
                multipart_body(UPLOAD_FIELD, "a.pdf", b"garbage"),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("not a PDF"));
        assert!(dir_is_empty(root.path()));
    }

    #[tokio::test]
    async fn timeout_is_gateway_timeout() {
        let root = tempfile::tempdir().unwrap();
        let resp = app(Behaviour::Timeout, root.path(), 1 << 20)
            .oneshot(upload_request(
                "/api/convert",
                multipart_body(UPLOAD_FIELD, "a.pdf", b"%PDF"),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let resp = app(Behaviour::Convert("x"), root.path(), 64)
            .oneshot(upload_request(
                "/api/convert",
                multipart_body(UPLOAD_FIELD, "a.pdf", &[b'x'; 4096]),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(dir_is_empty(root.path()));
    }

    #[tokio::test]
    async fn non_multipart_api_request_gets_json_error() {
        let root = tempfile::tempdir().unwrap();
        let req = Request::builder()
            .method("POST")
            .uri("/api/convert")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"pdf_file": "a.pdf"}"#))
            .unwrap();

        let resp = app(Behaviour::Convert("x"), root.path(), 1 << 20)
            .oneshot(req)
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("boundary"));
        assert!(dir_is_empty(root.path()));
    }

    #[tokio::test]
    async fn form_post_without_boundary_renders_error_page() {
        let root = tempfile::tempdir().unwrap();
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "multipart/form-data")
            .body(Body::empty())
            .unwrap();

        let resp = app(Behaviour::Convert("x"), root.path(), 1 << 20)
            .oneshot(req)
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let html = body_string(resp).await;
        assert!(html.contains("class=\"error\""));
    }

    #[tokio::test]
    async fn form_page_has_upload_field() {
        let root = tempfile::tempdir().unwrap();
        let resp = app(Behaviour::Fail, root.path(), 1024)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_string(resp).await;
        assert!(html.contains(r#"name="pdf_file""#));
        assert!(html.contains(r#"enctype="multipart/form-data""#));
    }

    #[tokio::test]
    async fn form_post_renders_escaped_wikitext() {
        let root = tempfile::tempdir().unwrap();
        let resp = app(
            Behaviour::Convert("<ref>cite</ref> & more"),
            root.path(),
            1 << 20,
        )
        .oneshot(upload_request(
            "/",
            multipart_body(UPLOAD_FIELD, "a.pdf", b"%PDF"),
        ))
        .await
        .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_string(resp).await;
        assert!(html.contains("&lt;ref&gt;cite&lt;/ref&gt; &amp; more"));
        assert!(!html.contains("<ref>"));
    }

    #[tokio::test]
    async fn form_post_shows_error_with_status() {
        let root = tempfile::tempdir().unwrap();
        let resp = app(Behaviour::Convert("x"), root.path(), 1 << 20)
            .oneshot(upload_request(
                "/",
                multipart_body(UPLOAD_FIELD, "notes.txt", b"hi"),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let html = body_string(resp).await;
        assert!(html.contains("Invalid file type"));
    }

    #[test]
    fn every_job_error_has_a_status() {
        assert_eq!(
            status_for(&JobError::invalid_input("x")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&JobError::ResultMissing {
                expected: "a_wikitext.txt".to_string()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&JobError::SandboxUnavailable {
                reason: "daemon down".to_string()
            }),
            StatusCode::BAD_GATEWAY
        );
    }
}
