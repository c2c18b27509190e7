use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use skyhold_booking::{Booking, NewBooking, PaymentAttempt};
use skyhold_core::payment::CardDetails;
use skyhold_core::BookingError;
use skyhold_shared::Masked;

use crate::error::{parse_id, AppError};
use crate::state::AppState;
use crate::IDEMPOTENCY_KEY;

#[derive(Deserialize)]
pub struct PaymentRequest {
    pub card_number: Masked<String>,
    pub expiry_date: String,
    pub cvv: Masked<String>,
}

#[derive(Debug, Serialize)]
struct PaymentResponse {
    success: bool,
    message: String,
    booking: Booking,
    attempt: PaymentAttempt,
    replayed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings/", get(list_bookings).post(create_booking))
        .route("/bookings/expire-seats/", post(expire_seats))
        .route("/bookings/{id}/", get(get_booking))
        .route("/bookings/{id}/cancel/", post(cancel_booking))
        .route("/bookings/{id}/process-payment/", post(process_payment))
        .route("/bookings/{id}/payments/", get(list_payments))
}

async fn list_bookings(State(state): State<AppState>) -> Json<Vec<Booking>> {
    Json(state.bookings.list())
}

async fn create_booking(
    State(state): State<AppState>,
    payload: Result<Json<NewBooking>, JsonRejection>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let Json(request) = payload.map_err(|e| AppError::validation(e.body_text()))?;

    match state.bookings.create(request).await {
        Ok(booking) => Ok((StatusCode::CREATED, Json(booking))),
        Err(e) => {
            if matches!(e, BookingError::SeatUnavailable(_)) {
                state.metrics.seat_conflicts.inc();
            }
            Err(AppError::Domain(e))
        }
    }
}

async fn get_booking(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Booking>, AppError> {
    let booking_id = parse_id(&id, "booking")?;
    Ok(Json(state.bookings.get(booking_id)?))
}

async fn cancel_booking(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Booking>, AppError> {
    let booking_id = parse_id(&id, "booking")?;
    Ok(Json(state.bookings.cancel(booking_id)?))
}

async fn list_payments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PaymentAttempt>>, AppError> {
    let booking_id = parse_id(&id, "booking")?;
    Ok(Json(state.bookings.attempts(booking_id)?))
}

async fn process_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Json<PaymentResponse>, AppError> {
    // 1. Parse inputs
    let booking_id = parse_id(&id, "booking")?;
    let Json(request) = payload.map_err(|e| AppError::validation(e.body_text()))?;
    let idempotency_key = idempotency_key(&headers)?;
    let card = CardDetails::new(request.card_number.expose(), &request.expiry_date, request.cvv.expose());

    // 2. Charge on a detached task so a dropped connection cannot strand the booking mid-charge
    let payments = state.payments.clone();
    let result = tokio::spawn(async move { payments.charge(booking_id, card, idempotency_key).await })
        .await
        .map_err(|e| anyhow::anyhow!("payment task failed: {}", e))??;

    // 3. Record and respond
    if !result.replayed {
        state
            .metrics
            .payment_attempts
            .with_label_values(&[result.attempt.outcome.as_str()])
            .inc();
    }
    let code = result.failure().map(|e| e.code());

    Ok(Json(PaymentResponse {
        success: result.success,
        message: result.message,
        booking: result.booking,
        attempt: result.attempt,
        replayed: result.replayed,
        code,
    }))
}

async fn expire_seats(State(state): State<AppState>) -> Json<Value> {
    let count = state.reaper.sweep();
    Json(json!({
        "message": format!("Expired {} bookings", count),
        "count": count,
    }))
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| AppError::validation("Idempotency-Key must be visible ASCII"))?
        .trim();
    if key.is_empty() || key.len() > 255 {
        return Err(AppError::validation("Idempotency-Key must be 1-255 characters"));
    }
    Ok(Some(key.to_string()))
}
