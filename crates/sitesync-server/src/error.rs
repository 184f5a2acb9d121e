use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use sitesync_protocol::ApiError;
use sitesync_reconcile::ReconcileError;
use sitesync_registry::RegistryError;
use sitesync_types::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) => ErrorKind::Validation,
            Self::Registry(e) => e.kind(),
            Self::Reconcile(e) => e.kind(),
            Self::Api(e) => e.kind,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        status_for(self.kind())
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::ConcurrencyConflict => StatusCode::CONFLICT,
        ErrorKind::TransientApplyFailure => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            Self::Api(err) => err,
            other => ApiError::new(other.kind(), other.to_string()),
        };
        if status.is_server_error() {
            tracing::error!(kind = %body.kind, message = %body.message, "request failed");
        }
        (status, Json(body)).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sitesync_types::{EntryId, SiteId};

    #[test]
    fn status_mapping() {
        assert_eq!(
            ServerError::Registry(RegistryError::EntryNotFound(EntryId::from("e"))).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::Reconcile(ReconcileError::SiteNotFound(SiteId::from("s"))).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::Api(ApiError::new(ErrorKind::ConcurrencyConflict, "race")).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(ErrorKind::TransientApplyFailure),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServerError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
