use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use homelinks_store::StoreError;
use serde_json::json;
use thiserror::Error;

use crate::health_probe::ProbeError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("failed to load: {0}")]
    Load(StoreError),
    #[error("failed to save: {0}")]
    Save(StoreError),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("Request timed out")]
    UpstreamTimeout,
    #[error("Failed to fetch: {0}")]
    Upstream(String),
}

impl AppError {
    pub fn load(err: StoreError) -> Self {
        AppError::Load(err)
    }

    /// Rejected input is the caller's fault; anything else is ours.
    pub fn save(err: StoreError) -> Self {
        if err.is_client_error() {
            AppError::BadRequest(err.to_string())
        } else {
            AppError::Save(err)
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::BadRequest(msg) => {
                tracing::debug!("Rejected request: {}", msg);
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            AppError::Load(_) => {
                tracing::error!("{}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "failed to load" }),
                )
            }
            AppError::Save(_) => {
                tracing::error!("{}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "failed to save" }),
                )
            }
            AppError::Upload(_) => {
                tracing::error!("{}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "upload failed" }),
                )
            }
            AppError::UpstreamTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                json!({ "error": "Request timed out" }),
            ),
            AppError::Upstream(msg) => {
                tracing::warn!("Health probe failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Failed to fetch", "message": msg }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<ProbeError> for AppError {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::InvalidUrl(msg) => AppError::BadRequest(msg),
            ProbeError::Timeout => AppError::UpstreamTimeout,
            ProbeError::Request(e) => AppError::Upstream(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn invalid_items_become_bad_request() {
        let err = AppError::save(StoreError::InvalidItems("duplicate item id 'a'".into()));
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn io_failures_are_generic_server_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = AppError::save(StoreError::Io {
            path: PathBuf::from("/data/home-links.json"),
            source: io,
        });
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn probe_timeout_maps_to_gateway_timeout() {
        let err: AppError = ProbeError::Timeout.into();
        assert_eq!(err.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
