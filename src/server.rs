use crate::config::Config;
use crate::error::NormalizeError;
use crate::preprocessing::{ConfigOverrides, Destination, Pipeline, Profile, Source};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ProfileInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub stages: Vec<&'static str>,
    pub binary_output: bool,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub profiles: Vec<ProfileInfo>,
    pub default_profile: String,
    pub output_formats: Vec<String>,
    pub max_file_size_bytes: usize,
}

/// Encodings accepted by the `format` field
const OUTPUT_FORMATS: &[&str] = &["png", "jpg", "bmp", "tiff"];

/// Build the router; split out of [`run`] so tests can drive it in-process
pub fn router(config: Config) -> Router {
    let max_file_size = config.max_file_size;
    let state = AppState {
        config: Arc::new(config),
    };

    Router::new()
        .route("/normalize", post(handle_normalize))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(max_file_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: Config) -> std::io::Result<()> {
    let addr = config.addr();
    let app = router(config);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await
}

/// Fields collected from the multipart form
#[derive(Default)]
struct NormalizeRequest {
    file: Option<(Vec<u8>, Option<String>)>,
    profile: Option<String>,
    config: Option<String>,
    format: Option<String>,
}

async fn read_form(multipart: &mut Multipart) -> Result<NormalizeRequest, NormalizeError> {
    let mut request = NormalizeRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| NormalizeError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let text_error = |e: MultipartError| {
            NormalizeError::InvalidRequest(format!("Invalid {} field: {}", name, e))
        };

        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(|s| s.to_string());
                let data = field.bytes().await.map_err(|e| {
                    NormalizeError::InvalidRequest(format!("Failed to read file data: {}", e))
                })?;
                request.file = Some((data.to_vec(), file_name));
            }
            "profile" => request.profile = Some(field.text().await.map_err(text_error)?),
            "config" => request.config = Some(field.text().await.map_err(text_error)?),
            "format" => request.format = Some(field.text().await.map_err(text_error)?),
            other => {
                tracing::debug!("Ignoring unknown form field '{}'", other);
            }
        }
    }

    Ok(request)
}

/// Handle normalization requests
async fn handle_normalize(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, NormalizeError> {
    let start = Instant::now();
    let request = read_form(&mut multipart).await?;

    let (data, file_name) = request.file.ok_or(NormalizeError::MissingFile)?;
    if data.len() > state.config.max_file_size {
        return Err(NormalizeError::ImageTooLarge {
            size: data.len(),
            max: state.config.max_file_size,
        });
    }

    let profile = match request.profile.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name
            .parse::<Profile>()
            .map_err(NormalizeError::InvalidRequest)?,
        _ => state.config.default_profile,
    };

    let mut overrides = match request.config.as_deref().map(str::trim) {
        Some(json) if !json.is_empty() => ConfigOverrides::from_json(json)?,
        _ => ConfigOverrides::default(),
    };
    if let Some(format) = request.format {
        let format = format.trim().trim_start_matches('.').to_lowercase();
        if !OUTPUT_FORMATS.contains(&format.as_str()) {
            return Err(NormalizeError::InvalidRequest(format!(
                "Unsupported output format '{}'",
                format
            )));
        }
        overrides.output_extension = Some(format);
    }

    let pipeline = Pipeline::with_overrides(profile, overrides)?;
    let source = Source::Bytes {
        data,
        name: file_name,
    };

    let result = tokio::task::spawn_blocking(move || pipeline.normalize(&source))
        .await
        .map_err(|e| NormalizeError::Internal(format!("Normalization task failed: {}", e)))??;

    let (format, bytes) = match result.destination {
        Destination::Buffer { format, bytes } => (format, bytes),
        Destination::File(path) => {
            return Err(NormalizeError::Internal(format!(
                "unexpected file output {}",
                path.display()
            )))
        }
    };

    let processing_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        "Normalization completed in {}ms, profile: {}, output: {} bytes",
        processing_time_ms,
        profile,
        bytes.len()
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(format.to_mime_type()),
    );
    headers.insert("x-profile", HeaderValue::from_static(profile.as_str()));
    headers.insert(
        "x-processing-time-ms",
        HeaderValue::from(processing_time_ms),
    );

    Ok((headers, bytes).into_response())
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    let profiles = Profile::ALL
        .iter()
        .map(|profile| ProfileInfo {
            name: profile.as_str(),
            description: profile.description(),
            stages: profile.stages().iter().map(|s| s.name()).collect(),
            binary_output: profile.is_binary(),
        })
        .collect();

    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        profiles,
        default_profile: state.config.default_profile.as_str().to_string(),
        output_formats: OUTPUT_FORMATS.iter().map(|s| s.to_string()).collect(),
        max_file_size_bytes: state.config.max_file_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use image::{GrayImage, Luma};
    use tower::ServiceExt;

    const BOUNDARY: &str = "receipt-test-boundary";

    fn png_receipt() -> Vec<u8> {
        let img = GrayImage::from_fn(60, 40, |x, y| {
            if (10..50).contains(&x) && y % 8 < 2 {
                Luma([35])
            } else {
                Luma([215])
            }
        });
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    fn multipart_body(file: Option<&[u8]>, fields: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(data) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"receipt.png\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn normalize_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/normalize")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(Config::default())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_info_lists_profiles() {
        let response = router(Config::default())
            .oneshot(Request::get("/info").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let json = json_body(response).await;
        let names: Vec<&str> = json["profiles"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "full-ocr",
                "minimal-grayscale",
                "receipt-aggressive",
                "contrast-only",
                "grayscale-only"
            ]
        );
        assert_eq!(json["default_profile"], "full-ocr");
        assert_eq!(json["profiles"][0]["binary_output"], true);
    }

    #[tokio::test]
    async fn test_normalize_returns_image() {
        let body = multipart_body(Some(&png_receipt()), &[("profile", "receipt-aggressive")]);
        let response = router(Config::default())
            .oneshot(normalize_request(body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/png");
        assert_eq!(response.headers()["x-profile"], "receipt-aggressive");
        assert!(response.headers().contains_key("x-processing-time-ms"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width().min(decoded.height()), 800);
    }

    #[tokio::test]
    async fn test_normalize_honours_format_and_overrides() {
        let body = multipart_body(
            Some(&png_receipt()),
            &[
                ("profile", "minimal"),
                ("config", r#"{"target_min_dimension": 120}"#),
                ("format", "jpg"),
            ],
        );
        let response = router(Config::default())
            .oneshot(normalize_request(body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/jpeg");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (180, 120));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let body = multipart_body(None, &[("profile", "full-ocr")]);
        let response = router(Config::default())
            .oneshot(normalize_request(body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "MISSING_FILE");
    }

    #[tokio::test]
    async fn test_unknown_profile() {
        let body = multipart_body(Some(&png_receipt()), &[("profile", "sepia")]);
        let response = router(Config::default())
            .oneshot(normalize_request(body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_invalid_config_override() {
        let body = multipart_body(
            Some(&png_receipt()),
            &[("config", r#"{"adaptive_threshold_block_size": 4}"#)],
        );
        let response = router(Config::default())
            .oneshot(normalize_request(body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "INVALID_CONFIG");
    }

    #[tokio::test]
    async fn test_undecodable_upload() {
        let body = multipart_body(Some(b"definitely not an image"), &[]);
        let response = router(Config::default())
            .oneshot(normalize_request(body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["code"], "UNREADABLE_IMAGE");
    }

    #[tokio::test]
    async fn test_upload_over_configured_limit() {
        let config = Config {
            max_file_size: 64,
            ..Config::default()
        };
        let body = multipart_body(Some(&png_receipt()), &[]);
        let response = router(config)
            .oneshot(normalize_request(body))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
