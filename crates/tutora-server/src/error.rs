use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tutora_core::CoreError;

/// Machine-readable error envelope every failing endpoint returns.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

/// Handler-level error: carries the core failure and maps it onto the HTTP
/// contract. Unexpected storage failures deliberately hide their detail
/// behind a generic message.
#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self.0 {
            CoreError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: format!("validation failed for fields: {}", fields.join(", ")),
                    code: "validation_error",
                    fields: Some(fields),
                },
            ),
            CoreError::InvalidMonth(raw) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: format!("invalid month `{raw}`, expected YYYY-MM"),
                    code: "invalid_month",
                    fields: None,
                },
            ),
            CoreError::StudentNotFound(id) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: format!("student not found: {id}"),
                    code: "not_found",
                    fields: None,
                },
            ),
            CoreError::PaymentNotFound(id) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: format!("payment not found: {id}"),
                    code: "not_found",
                    fields: None,
                },
            ),
            CoreError::ImportFormat(reason) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: format!("import rejected: {reason}"),
                    code: "import_format",
                    fields: None,
                },
            ),
            err @ (CoreError::Storage(_) | CoreError::Serde(_)) => {
                tracing::error!(error = %err, "request failed on storage layer");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: "internal server error".to_string(),
                        code: "internal_error",
                        fields: None,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
