//! Response plumbing: error bodies, JSON request bodies with uniform rejections,
//! and file bodies streamed with range headers.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::header::{
    ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LAST_MODIFIED, RETRY_AFTER,
};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::{error, warn};

use crate::error::AppError;
use crate::files::{Disposition, ServedFile};

pub const PREVIEW_TRUNCATED_HEADER: &str = "x-preview-truncated";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(target: "http", code = self.code_str(), "{}", self.message());
        } else {
            warn!(target: "http", status = status.as_u16(), code = self.code_str(), "{}", self.message());
        }
        let body = Json(json!({"status": "error", "code": self.code_str(), "message": self.message()}));
        let mut resp = (status, body).into_response();
        match &self {
            AppError::RangeNotSatisfiable { size, .. } => {
                if let Ok(v) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                    resp.headers_mut().insert(CONTENT_RANGE, v);
                }
            }
            AppError::TooManyRequests { retry_after, .. } => {
                resp.headers_mut().insert(RETRY_AFTER, HeaderValue::from(*retry_after));
            }
            _ => {}
        }
        resp
    }
}

/// `Json<T>` whose rejections use the API error body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(v)) => Ok(ApiJson(v)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    AppError::user("invalid_body", rejection.body_text())
}

/// Stream `file` with 200 or 206 and the usual range/caching headers.
pub fn served(file: ServedFile, disposition: Disposition) -> Response {
    let status = if file.is_partial() { StatusCode::PARTIAL_CONTENT } else { StatusCode::OK };
    let mut builder = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, file.mime.as_str())
        .header(CONTENT_LENGTH, file.content_length)
        .header(ACCEPT_RANGES, "bytes")
        .header(CONTENT_DISPOSITION, disposition.header_value(&file.name));
    if let Some(range) = file.content_range() {
        builder = builder.header(CONTENT_RANGE, range);
    }
    if let Some(modified) = file.last_modified {
        builder = builder.header(LAST_MODIFIED, httpdate::fmt_http_date(modified));
    }
    if file.truncated {
        builder = builder.header(PREVIEW_TRUNCATED_HEADER, "true");
    }
    builder
        .body(Body::from_stream(ReaderStream::new(file.reader)))
        .unwrap_or_else(|e| AppError::internal("response_build_failed", e.to_string()).into_response())
}
