//! Serve command - HTTP upload endpoint for NFe extraction.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header::HeaderValue, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Args;
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use nfe_core::models::config::ServerConfig;
use nfe_core::pipeline::UNSUPPORTED_TYPE;
use nfe_core::{DocumentKind, DocumentProcessor, ExtractionResponse};

/// Header carrying the client API key.
const API_KEY_HEADER: &str = "x-api-key";

/// Multipart field holding the document.
const FILE_FIELD: &str = "file";

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// Bind address
    #[arg(long)]
    host: Option<String>,

    /// Bind port
    #[arg(short, long)]
    port: Option<u16>,

    /// Require this value in the x-api-key header
    #[arg(long, env = "NFE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<DocumentProcessor>,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(processor: DocumentProcessor, api_key: Option<String>) -> Self {
        Self {
            processor: Arc::new(processor),
            api_key: api_key.map(Arc::from),
        }
    }
}

/// An uploaded document as received.
struct Upload {
    content_type: Option<String>,
    bytes: Vec<u8>,
}

pub async fn run(args: ServeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = super::config::load(config_path)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.api_key.is_some() {
        config.server.api_key = args.api_key;
    }

    // Format probing and engine setup happen once, before accepting requests
    let processor = DocumentProcessor::from_config(&config)?;
    info!(
        "OCR engine: {}, HEIC/HEIF: {}",
        processor.engine_name(),
        if processor.decoder().supports_heif() { "enabled" } else { "disabled" }
    );
    if config.server.api_key.is_none() {
        warn!("No API key configured, /extract-info is open to any client");
    }

    let state = AppState::new(processor, config.server.api_key.clone());
    let app = create_router(state, &config.server);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Create the router with all routes.
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/extract-info", post(extract_info))
        .layer(DefaultBodyLimit::max(server.max_upload_bytes))
        .layer(cors_layer(&server.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "engine": state.processor.engine_name(),
        "heif": state.processor.decoder().supports_heif(),
    }))
}

async fn extract_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if let Some(expected) = &state.api_key {
        let provided = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_ref()) {
            return error_response(StatusCode::UNAUTHORIZED, "Invalid or missing API key");
        }
    }

    let upload = match read_upload(&mut multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Missing multipart field '{}'", FILE_FIELD),
            );
        }
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let Some(kind) = upload
        .content_type
        .as_deref()
        .and_then(DocumentKind::from_content_type)
    else {
        debug!("Rejected upload with content type {:?}", upload.content_type);
        return error_response(StatusCode::UNSUPPORTED_MEDIA_TYPE, UNSUPPORTED_TYPE);
    };

    info!("Received {:?} upload ({} bytes)", kind, upload.bytes.len());

    let processor = Arc::clone(&state.processor);
    match tokio::task::spawn_blocking(move || processor.respond(&upload.bytes, kind)).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Processing task failed: {}", e),
        ),
    }
}

/// Read the `file` field, skipping any other fields.
async fn read_upload(multipart: &mut Multipart) -> Result<Option<Upload>, String> {
    while let Some(field) = multipart.next_field().await.map_err(|e| e.body_text())? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| e.body_text())?;
        return Ok(Some(Upload {
            content_type,
            bytes: bytes.to_vec(),
        }));
    }

    Ok(None)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ExtractionResponse::failure(message))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use nfe_core::decode::DocumentDecoder;
    use nfe_core::error::OcrError;
    use nfe_core::{NfeConfig, OcrEngine};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "nfe-test-boundary";

    struct FixedEngine(&'static str);

    impl OcrEngine for FixedEngine {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
            Ok(self.0.to_string())
        }
    }

    fn app(ocr_text: &'static str, api_key: Option<&str>) -> Router {
        let config = NfeConfig::default();
        let processor = DocumentProcessor::new(
            DocumentDecoder::without_heif(),
            Box::new(FixedEngine(ocr_text)),
            &config,
        );
        create_router(
            AppState::new(processor, api_key.map(str::to_string)),
            &config.server,
        )
    }

    fn png_bytes() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(8, 8))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn upload(content_type: &str, bytes: &[u8], api_key: Option<&str>) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"nota\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let mut builder = Request::builder()
            .method("POST")
            .uri("/extract-info")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(key) = api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    const DANFE: &str = "CHAVE DE ACESSO\n\
        3523 0812 3456 7800 0199 5500 1000 0001 2310 0000 0128\n\
        DESTINATARIO\n\
        CNPJ/CPF 98.765.432/0001-10";

    #[tokio::test]
    async fn test_health() {
        let response = app(DANFE, None)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["engine"], "fixed");
    }

    #[tokio::test]
    async fn test_extract_png() {
        let response = app(DANFE, None)
            .oneshot(upload("image/png", &png_bytes(), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({
                "chave_acesso": "35230812345678000199550010000001231000000128",
                "cnpj_destinatario": "98765432000110",
                "cpf_destinatario": null,
            })
        );
    }

    #[tokio::test]
    async fn test_unsupported_type_is_rejected() {
        let response = app(DANFE, None)
            .oneshot(upload("text/plain", b"hello", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let json = json_body(response).await;
        assert_eq!(json["error"], UNSUPPORTED_TYPE);
        assert!(json["chave_acesso"].is_null());
    }

    #[tokio::test]
    async fn test_missing_access_key_is_reported() {
        let response = app("DESTINATARIO\nCPF 123.456.789-09", None)
            .oneshot(upload("image/jpeg", &png_bytes(), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["error"], "access key not found");
        assert!(json["cpf_destinatario"].is_null());
    }

    #[tokio::test]
    async fn test_decode_failure_is_reported() {
        let response = app(DANFE, None)
            .oneshot(upload("image/png", b"not really a png", None))
            .await
            .unwrap();

        let json = json_body(response).await;
        assert!(json["error"].as_str().unwrap().starts_with("decode error"));
        assert!(json["chave_acesso"].is_null());
    }

    #[tokio::test]
    async fn test_api_key_required() {
        let missing = app(DANFE, Some("secret"))
            .oneshot(upload("image/png", &png_bytes(), None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app(DANFE, Some("secret"))
            .oneshot(upload("image/png", &png_bytes(), Some("guess")))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let ok = app(DANFE, Some("secret"))
            .oneshot(upload("image/png", &png_bytes(), Some("secret")))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--{BOUNDARY}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/extract-info")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap();

        let response = app(DANFE, None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
