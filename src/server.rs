//! HTTP routing layer.
//!
//! Thin collaborator around [`ScreenshotService`]: query validation,
//! capture response headers, the health probe, and the mapping from
//! failure kinds to HTTP statuses.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PageshotError, Result};
use crate::service::{CaptureRequest, ScreenshotService, IMAGE_CONTENT_TYPE};

/// Captured images are safely cacheable by their full query fingerprint.
const CACHE_CONTROL: &str = "public, max-age=3600";

pub fn router(service: Arc<ScreenshotService>) -> Router {
    Router::new()
        .route("/", get(capture))
        .route("/health", get(health))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
struct CaptureQuery {
    url: String,
    width: Option<u32>,
    height: Option<u32>,
    /// Extra wait after network-idle, in milliseconds. `idletime` is the
    /// parameter name an earlier deployment used; both are accepted.
    #[serde(default, alias = "idletime")]
    settletime: Option<u64>,
}

/// JSON body returned for failed requests.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status_code: u16,
    message: String,
    timestamp: DateTime<Utc>,
}

async fn health() -> &'static str {
    "OK"
}

async fn capture(
    State(service): State<Arc<ScreenshotService>>,
    Query(query): Query<CaptureQuery>,
) -> Response {
    if let Err(err) = validate_query(&query) {
        return error_response(&err);
    }

    let request = CaptureRequest {
        url: query.url,
        width: query.width,
        height: query.height,
        settle: query.settletime.map(Duration::from_millis),
    };

    match service.capture(request).await {
        Ok(result) => (
            [
                (header::CONTENT_TYPE, IMAGE_CONTENT_TYPE),
                (header::CACHE_CONTROL, CACHE_CONTROL),
            ],
            result.bytes,
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

fn validate_query(query: &CaptureQuery) -> Result<()> {
    let parsed = url::Url::parse(&query.url)?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(PageshotError::BadRequest(format!(
                "unsupported URL scheme '{other}'; expected http or https"
            )))
        }
    }
    if query.width == Some(0) || query.height == Some(0) {
        return Err(PageshotError::BadRequest(
            "viewport dimensions must be positive".to_string(),
        ));
    }
    Ok(())
}

fn error_response(err: &PageshotError) -> Response {
    let status_code = err.status_code();
    let status =
        StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorBody {
            status_code,
            message: err.to_string(),
            timestamp: Utc::now(),
        }),
    )
        .into_response()
}
