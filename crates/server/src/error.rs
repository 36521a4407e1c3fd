use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use medidoc_vault::VaultError;

/// Body returned for every failed public download, whatever the cause.
pub const INVALID_DOWNLOAD_LINK: &str = "download link is invalid or has expired";

/// Errors that can occur when running the medidoc server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A vault-level error surfaced through the API.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// The request itself was malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The multipart body could not be read.
    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    /// Authentication failed (missing or invalid credentials).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A public download link could not be redeemed. The cause is logged,
    /// never returned.
    #[error("download link is invalid or has expired")]
    InvalidDownloadLink,
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Multipart(e) => e.status(),
            Self::InvalidDownloadLink => StatusCode::NOT_FOUND,
            Self::Config(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Vault(e) => vault_status(e),
        }
    }
}

fn vault_status(err: &VaultError) -> StatusCode {
    match err {
        VaultError::Validation(_) => StatusCode::BAD_REQUEST,
        VaultError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        VaultError::Forbidden => StatusCode::FORBIDDEN,
        VaultError::NotFound(_) => StatusCode::NOT_FOUND,
        VaultError::Expired => StatusCode::GONE,
        VaultError::AlreadyUsed => StatusCode::CONFLICT,
        VaultError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        VaultError::Integrity(_)
        | VaultError::Storage(_)
        | VaultError::State(_)
        | VaultError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            match status {
                StatusCode::SERVICE_UNAVAILABLE => "storage temporarily unavailable".to_owned(),
                _ => "internal server error".to_owned(),
            }
        } else {
            self.to_string()
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: ServerError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn vault_errors_map_to_distinct_statuses() {
        let cases = [
            (VaultError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                VaultError::TooLarge { size: 2, limit: 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (VaultError::Forbidden, StatusCode::FORBIDDEN),
            (VaultError::NotFound("d".into()), StatusCode::NOT_FOUND),
            (VaultError::Expired, StatusCode::GONE),
            (VaultError::AlreadyUsed, StatusCode::CONFLICT),
            (
                VaultError::StorageUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                VaultError::Integrity("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ServerError::from(err).status(), expected);
        }
    }

    #[tokio::test]
    async fn invalid_download_link_body_is_generic() {
        let (status, body) = body_of(ServerError::InvalidDownloadLink).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], INVALID_DOWNLOAD_LINK);
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_details() {
        let err = ServerError::Vault(VaultError::Integrity("blob abc is missing".into()));
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal server error");
    }

    #[tokio::test]
    async fn forbidden_body_names_the_condition() {
        let (status, body) = body_of(ServerError::Vault(VaultError::Forbidden)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "access denied");
    }
}
