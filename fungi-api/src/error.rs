use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use fungi_core::LedgerError;
use serde_json::json;

/// Every handler failure, including rejected request input, ends up here so
/// clients always get `{error, code}`.
#[derive(Debug)]
pub struct AppError(pub LedgerError);

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::AlreadyClaimed { .. } | LedgerError::Full { .. } => StatusCode::CONFLICT,
            LedgerError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            LedgerError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let err = self.0;

        if let LedgerError::StoreUnavailable(_) = err {
            tracing::error!("Store unavailable: {}", err);
        }

        let body = Json(json!({
            "error": err.to_string(),
            "code": err.code(),
        }));

        (status, body).into_response()
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}
