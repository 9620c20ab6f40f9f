use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path as AxumPath, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use sharelock_crypto::{PlaintextCredential, ResourceId};
use sharelock_gateway::{AccessDecision, AccessGateway, Locator};
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::codes::data_url;
use crate::errors::ApiError;
use crate::upload::read_registration;

/// Header carrying the credential when it is not passed as `?key=`.
pub const CREDENTIAL_HEADER: &str = "x-private-key";

/// Extra request body allowance over the file limit for the other form fields.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<AccessGateway>,
    pub start_time: Instant,
    pub public_dir: Option<PathBuf>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(gateway: Arc<AccessGateway>) -> Self {
        Self {
            gateway,
            start_time: Instant::now(),
            public_dir: None,
            metrics: None,
        }
    }

    pub fn with_public_dir(mut self, public_dir: Option<PathBuf>) -> Self {
        self.public_dir = public_dir;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<PrometheusHandle>) -> Self {
        self.metrics = metrics;
        self
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn body_limit(&self) -> usize {
        usize::try_from(self.gateway.policy().max_bytes)
            .unwrap_or(usize::MAX)
            .saturating_add(BODY_LIMIT_SLACK)
    }
}

type SharedState = Arc<AppState>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    resources: usize,
    private_registrations_enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub file_id: String,
    pub qr_url: String,
    pub qr_data_url: String,
    pub private_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccessQuery {
    #[serde(default)]
    key: Option<String>,
}

pub async fn start_server<F>(state: AppState, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let listener = bind_listener(addr).await?;
    info!("HTTP API listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {addr}"))
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.body_limit();
    let state: SharedState = Arc::new(state);

    let mut router = Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .route("/api/upload", post(handle_upload))
        .route("/api/access/:id", get(handle_access))
        .route("/qr-images/:file", get(handle_code_image));

    if let Some(public_dir) = &state.public_dir {
        if public_dir.exists() {
            info!("Serving static assets from {:?}", public_dir);
            router = router.fallback(serve_static_assets);
        } else {
            warn!("Static assets directory {:?} does not exist", public_dir);
        }
    }

    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn serve_static_assets(State(state): State<SharedState>, req: Request<Body>) -> Response {
    let Some(public_dir) = state.public_dir.clone() else {
        return ApiError::not_found("Not Found").into_response();
    };
    let service = ServeDir::new(public_dir).append_index_html_on_directories(true);
    match service.oneshot(req).await {
        Ok(response) => response.into_response(),
        Err(err) => {
            warn!("Static asset error: {}", err);
            ApiError::internal(format!("failed to serve static asset: {err}")).into_response()
        }
    }
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_seconds(),
        resources: state.gateway.registry().len(),
        private_registrations_enabled: state.gateway.private_registrations_enabled(),
    })
}

async fn handle_metrics(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let handle = state
        .metrics
        .as_ref()
        .ok_or_else(|| ApiError::not_found("Metrics are disabled"))?;

    let mut response = Response::new(Body::from(handle.render()));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    Ok(response)
}

async fn handle_upload(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let request = read_registration(multipart, state.gateway.policy().max_bytes).await?;

    let gateway = state.gateway.clone();
    let receipt = tokio::task::spawn_blocking(move || gateway.register(request))
        .await
        .map_err(|err| ApiError::internal(format!("registration task failed: {err}")))??;

    Ok(Json(UploadResponse {
        success: true,
        file_id: receipt.id.to_hex(),
        qr_url: format!("/qr-images/{}.png", receipt.id),
        qr_data_url: data_url(&receipt.code_image),
        private_key: receipt.credential.map(PlaintextCredential::into_inner),
    }))
}

async fn handle_access(
    State(state): State<SharedState>,
    AxumPath(id): AxumPath<String>,
    Query(query): Query<AccessQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let credential = query.key.filter(|k| !k.is_empty()).or_else(|| {
        headers
            .get(CREDENTIAL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    match state.gateway.access_raw(&id, credential.as_deref())? {
        AccessDecision::Denied(reason) => Err(reason.into()),
        AccessDecision::Granted(locator) => serve_locator(&state, locator).await,
    }
}

async fn serve_locator(state: &SharedState, locator: Locator) -> Result<Response, ApiError> {
    let (content_type, original_name) = match &locator {
        Locator::Redirect { address } => {
            let location = HeaderValue::from_str(address)
                .map_err(|_| ApiError::internal("Stored address is not a valid redirect target"))?;
            return Ok((StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, location)])
                .into_response());
        }
        Locator::File {
            content_type,
            original_name,
            ..
        } => (content_type.clone(), original_name.clone()),
    };

    let gateway = state.gateway.clone();
    let bytes = tokio::task::spawn_blocking(move || gateway.read_content(&locator))
        .await
        .map_err(|err| ApiError::internal(format!("content task failed: {err}")))??
        .ok_or_else(|| ApiError::internal("File locator yielded no content"))?;

    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition(original_name.as_deref()),
    );
    Ok(response)
}

fn content_disposition(original_name: Option<&str>) -> HeaderValue {
    let inline = HeaderValue::from_static("inline");
    let Some(name) = original_name else {
        return inline;
    };
    let safe: String = name
        .chars()
        .filter(|c| (c.is_ascii_graphic() || *c == ' ') && *c != '"' && *c != '\\')
        .collect();
    if safe.trim().is_empty() {
        return inline;
    }
    HeaderValue::from_str(&format!("inline; filename=\"{}\"", safe)).unwrap_or(inline)
}

async fn handle_code_image(
    State(state): State<SharedState>,
    AxumPath(file): AxumPath<String>,
) -> Result<Response, ApiError> {
    let id = file
        .strip_suffix(".png")
        .and_then(|hex| hex.parse::<ResourceId>().ok())
        .ok_or_else(|| ApiError::not_found("Code not found"))?;

    let gateway = state.gateway.clone();
    let image = tokio::task::spawn_blocking(move || gateway.code_for(&id))
        .await
        .map_err(|err| ApiError::internal(format!("code task failed: {err}")))??
        .ok_or_else(|| ApiError::not_found("Code not found"))?;

    let mut response = Response::new(Body::from(image.bytes));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&image.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    Ok(response)
}
