pub mod clock;
pub mod payment;

pub use clock::{Clock, ManualClock, SystemClock};

/// Failure reasons surfaced to booking clients. None of these are retried by the server.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    #[error("Seat {0} is not available")]
    SeatUnavailable(String),
    #[error("Seat hold for booking {0} has expired")]
    HoldExpired(String),
    #[error("Booking {id} is {state}; cannot {action}")]
    InvalidState {
        id: String,
        state: String,
        action: String,
    },
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: String,
    },
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),
    #[error("Payment gateway error: {0}")]
    PaymentGatewayError(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BookingError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        BookingError::NotFound { entity, id: id.to_string() }
    }

    pub fn invalid_state(id: impl ToString, state: impl ToString, action: &str) -> Self {
        BookingError::InvalidState {
            id: id.to_string(),
            state: state.to_string(),
            action: action.to_string(),
        }
    }

    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::SeatUnavailable(_) => "SEAT_UNAVAILABLE",
            BookingError::HoldExpired(_) => "HOLD_EXPIRED",
            BookingError::InvalidState { .. } => "INVALID_STATE",
            BookingError::NotFound { .. } => "NOT_FOUND",
            BookingError::PaymentDeclined(_) => "PAYMENT_DECLINED",
            BookingError::PaymentGatewayError(_) => "PAYMENT_GATEWAY_ERROR",
            BookingError::Validation(_) => "VALIDATION_ERROR",
            BookingError::Internal(_) => "INTERNAL",
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
