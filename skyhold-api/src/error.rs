use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use skyhold_catalog::CatalogError;
use skyhold_core::BookingError;
use uuid::Uuid;

#[derive(Debug)]
pub enum AppError {
    Domain(BookingError),
    Anyhow(anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Domain(BookingError::Validation(message.into()))
    }
}

pub fn status_for(err: &BookingError) -> StatusCode {
    match err {
        BookingError::NotFound { .. } => StatusCode::NOT_FOUND,
        BookingError::SeatUnavailable(_) | BookingError::InvalidState { .. } => StatusCode::CONFLICT,
        BookingError::HoldExpired(_) => StatusCode::GONE,
        BookingError::Validation(_) => StatusCode::BAD_REQUEST,
        BookingError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
        BookingError::PaymentGatewayError(_) => StatusCode::BAD_GATEWAY,
        BookingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Ids that do not parse cannot name anything, so they are reported as missing.
pub fn parse_id(raw: &str, entity: &'static str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::Domain(BookingError::not_found(entity, raw)))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code) = match self {
            AppError::Domain(BookingError::Internal(msg)) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string(), "INTERNAL")
            }
            AppError::Domain(err) => (status_for(&err), err.to_string(), err.code()),
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string(), "INTERNAL")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        let err = match err.downcast::<BookingError>() {
            Ok(domain) => return Self::Domain(domain),
            Err(err) => err,
        };
        match err.downcast::<CatalogError>() {
            Ok(catalog) => Self::Domain(catalog.into()),
            Err(err) => Self::Anyhow(err),
        }
    }
}
