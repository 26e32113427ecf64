//! Security middleware for the credit engine API
//!
//! - API key authentication on write routes
//! - Request body size limit
//! - Security headers
//! - Request logging with sanitization

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, mask_secret};

#[derive(Debug, Clone)]
pub struct SecurityMiddlewareConfig {
    pub enable_auth: bool,
    pub api_keys: Vec<String>,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
    pub log_requests: bool,
    pub sanitize_logs: bool,
    /// Write paths that authenticate by other means (signed payloads)
    pub public_paths: Vec<String>,
}

impl Default for SecurityMiddlewareConfig {
    fn default() -> Self {
        Self {
            enable_auth: true,
            api_keys: Vec::new(),
            max_request_size: 256 * 1024,
            log_requests: true,
            sanitize_logs: true,
            public_paths: vec!["/crosschain/receive".to_string()],
        }
    }
}

impl SecurityMiddlewareConfig {
    pub fn from_engine_config(config: &EngineConfig) -> Self {
        Self {
            enable_auth: config.security.enable_auth,
            api_keys: config.security.api_keys.clone(),
            log_requests: config.logging.log_requests,
            sanitize_logs: config.logging.sanitize_logs,
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct SecurityState {
    pub config: SecurityMiddlewareConfig,
}

impl SecurityState {
    pub fn new(config: SecurityMiddlewareConfig) -> Self {
        Self { config }
    }
}

/// Reads never mutate engine state and stay open
fn is_read_only(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn is_public_path(path: &str, public_paths: &[String]) -> bool {
    public_paths.iter().any(|p| path.starts_with(p.as_str()))
}

/// API key authentication for write routes
pub async fn auth_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let path = request.uri().path().to_string();

    if !state.config.enable_auth
        || is_read_only(request.method())
        || is_public_path(&path, &state.config.public_paths)
    {
        return Ok(next.run(request).await);
    }

    let api_key = headers
        .get("x-api-key")
        .or_else(|| headers.get("authorization"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_start_matches("Bearer ").to_string());

    match api_key {
        Some(key) if state.config.api_keys.contains(&key) => {
            debug!(path = %path, "API key authenticated");
            Ok(next.run(request).await)
        }
        Some(key) => {
            let shown = if state.config.sanitize_logs {
                mask_secret(&key)
            } else {
                key
            };
            warn!(path = %path, key = %shown, "Invalid API key");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            warn!(path = %path, "Missing API key");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

pub async fn body_size_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let declared = headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    if let Some(length) = declared {
        if length > state.config.max_request_size {
            warn!(
                length,
                max = state.config.max_request_size,
                "Request body too large"
            );
            return Err(StatusCode::PAYLOAD_TOO_LARGE);
        }
    }

    Ok(next.run(request).await)
}

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    // Engine state changes on every write; never cache
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    headers.remove("Server");

    response
}

pub async fn logging_middleware(
    State(state): State<SecurityState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.log_requests {
        return next.run(request).await;
    }

    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis();
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        error!(method = %method, path = %path, status, duration_ms, "Request failed");
    } else if response.status().is_client_error() {
        warn!(method = %method, path = %path, status, duration_ms, "Request rejected");
    } else {
        info!(method = %method, path = %path, status, duration_ms, "Request completed");
    }

    response
}
