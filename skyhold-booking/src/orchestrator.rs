use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use skyhold_core::payment::{CardDetails, ChargeRequest, GatewayFailure, GatewayReceipt, PaymentGateway};
use skyhold_core::{BookingError, BookingResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::hold::lock;
use crate::lifecycle::{BookingLifecycle, PaymentStart};
use crate::models::{AttemptOutcome, Booking, BookingState, PaymentAttempt};

/// Outcome of one payment submission, success or not.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentResult {
    pub success: bool,
    pub booking: Booking,
    pub attempt: PaymentAttempt,
    pub message: String,
    /// True when the result came from an earlier attempt with the same idempotency key
    pub replayed: bool,
}

impl PaymentResult {
    fn from_attempt(booking: Booking, attempt: PaymentAttempt, replayed: bool) -> Self {
        let success = attempt.outcome == AttemptOutcome::Succeeded;
        let message = if success {
            "Payment successful".to_string()
        } else if booking.state == BookingState::Expired {
            "Payment failed and the seat hold has expired".to_string()
        } else {
            let reason = attempt.failure_reason.as_deref().unwrap_or("unknown error");
            format!("Payment failed ({reason}). Please try again.")
        };
        Self { success, booking, attempt, message, replayed }
    }

    /// The taxonomy error for a failed charge
    pub fn failure(&self) -> Option<BookingError> {
        self.attempt.failure()
    }
}

/// Charges bookings through the gateway, at most once per attempt.
pub struct PaymentOrchestrator {
    lifecycle: Arc<BookingLifecycle>,
    gateway: Arc<dyn PaymentGateway>,
    gateway_timeout: Duration,
}

impl PaymentOrchestrator {
    pub fn new(lifecycle: Arc<BookingLifecycle>, gateway: Arc<dyn PaymentGateway>, gateway_timeout: Duration) -> Self {
        Self {
            lifecycle,
            gateway,
            gateway_timeout,
        }
    }

    /// Submit a payment for a booking.
    ///
    /// Declines and gateway errors come back as `Ok` with `success == false`;
    /// `Err` means the attempt never reached the gateway.
    pub async fn charge(
        &self,
        booking_id: Uuid,
        card: CardDetails,
        idempotency_key: Option<String>,
    ) -> BookingResult<PaymentResult> {
        // 1. Reject malformed cards before touching any state
        card.validate()?;

        // 2. Claim the booking for this attempt
        let (booking, attempt) =
            match self.lifecycle.begin_payment(booking_id, idempotency_key, card.card_number.last_four())? {
                PaymentStart::Replay { booking, attempt } => {
                    return Ok(PaymentResult::from_attempt(booking, attempt, true));
                }
                PaymentStart::Proceed { booking, attempt } => (booking, attempt),
            };

        // 3. Single gateway call, no lock held. Client keys are only unique per booking.
        let request = ChargeRequest {
            idempotency_key: gateway_key(booking_id, &attempt.idempotency_key),
            booking_id,
            amount: booking.payment_amount,
            currency: booking.currency.clone(),
            card,
        };
        let outcome = match tokio::time::timeout(self.gateway_timeout, self.gateway.charge(&request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(
                    booking_id = %booking_id,
                    timeout_ms = self.gateway_timeout.as_millis() as u64,
                    "Payment gateway timed out"
                );
                Err(GatewayFailure::Unavailable(format!(
                    "gateway timed out after {}ms",
                    self.gateway_timeout.as_millis()
                )))
            }
        };
        if let Err(GatewayFailure::Unavailable(reason)) = &outcome {
            tracing::error!(booking_id = %booking_id, reason = %reason, "Payment gateway error");
        }

        // 4. Reconcile
        let (booking, attempt) = self.lifecycle.complete_payment(booking_id, attempt.id, outcome)?;
        Ok(PaymentResult::from_attempt(booking, attempt, false))
    }
}

/// Key sent to the gateway for an attempt, scoped to its booking.
fn gateway_key(booking_id: Uuid, idempotency_key: &str) -> String {
    format!("{booking_id}:{idempotency_key}")
}

/// Test card that is always declined
pub const DECLINED_CARD: &str = "4000000000000002";
/// Test card declined for insufficient funds
pub const INSUFFICIENT_FUNDS_CARD: &str = "4000000000009995";
/// Test card that triggers a gateway processing error
pub const PROCESSING_ERROR_CARD: &str = "4000000000000119";

/// In-process stand-in for the payment network.
///
/// Known test cards behave deterministically; any other card is declined
/// with probability `decline_rate`. Repeating an idempotency key returns the
/// first result without charging again.
pub struct SimulatedGateway {
    decline_rate: f64,
    latency: Duration,
    processed: Mutex<HashMap<String, Result<GatewayReceipt, GatewayFailure>>>,
}

impl SimulatedGateway {
    pub fn new(decline_rate: f64, latency: Duration) -> Self {
        Self {
            decline_rate: decline_rate.clamp(0.0, 1.0),
            latency,
            processed: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct charges seen
    pub fn charge_count(&self) -> usize {
        lock(&self.processed).len()
    }

    fn decide(&self, card: &CardDetails) -> Result<GatewayReceipt, GatewayFailure> {
        match card.card_number.expose().as_str() {
            DECLINED_CARD => return Err(GatewayFailure::Declined("card_declined".to_string())),
            INSUFFICIENT_FUNDS_CARD => return Err(GatewayFailure::Declined("insufficient_funds".to_string())),
            PROCESSING_ERROR_CARD => return Err(GatewayFailure::Unavailable("processing_error".to_string())),
            _ => {}
        }

        if card.is_expired_on(Utc::now().date_naive()) {
            return Err(GatewayFailure::Declined("expired_card".to_string()));
        }

        if self.decline_rate > 0.0 && rand::thread_rng().gen_bool(self.decline_rate) {
            return Err(GatewayFailure::Declined("card_declined".to_string()));
        }

        Ok(GatewayReceipt {
            reference: format!("ch_{}", Uuid::new_v4().simple()),
        })
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(0.0, Duration::ZERO)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<GatewayReceipt, GatewayFailure> {
        if let Some(previous) = lock(&self.processed).get(&request.idempotency_key) {
            return previous.clone();
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = self.decide(&request.card);
        lock(&self.processed)
            .entry(request.idempotency_key.clone())
            .or_insert(outcome)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(card_number: &str, key: &str) -> ChargeRequest {
        ChargeRequest {
            idempotency_key: key.to_string(),
            booking_id: Uuid::new_v4(),
            amount: 45_000,
            currency: "USD".to_string(),
            card: CardDetails::new(card_number, "12/39", "123"),
        }
    }

    #[tokio::test]
    async fn test_known_cards_are_deterministic() {
        let gateway = SimulatedGateway::default();

        let ok = gateway.charge(&request("4242424242424242", "k1")).await.unwrap();
        assert!(ok.reference.starts_with("ch_"));

        let declined = gateway.charge(&request(DECLINED_CARD, "k2")).await.unwrap_err();
        assert_eq!(declined, GatewayFailure::Declined("card_declined".into()));

        let funds = gateway.charge(&request(INSUFFICIENT_FUNDS_CARD, "k3")).await.unwrap_err();
        assert_eq!(funds, GatewayFailure::Declined("insufficient_funds".into()));

        let error = gateway.charge(&request(PROCESSING_ERROR_CARD, "k4")).await.unwrap_err();
        assert!(matches!(error, GatewayFailure::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_expired_card_is_declined() {
        let gateway = SimulatedGateway::default();
        let mut req = request("4242424242424242", "k1");
        req.card = CardDetails::new("4242424242424242", "01/20", "123");

        let err = gateway.charge(&req).await.unwrap_err();
        assert_eq!(err, GatewayFailure::Declined("expired_card".into()));
    }

    #[tokio::test]
    async fn test_duplicate_key_is_not_charged_twice() {
        let gateway = SimulatedGateway::default();
        let first = gateway.charge(&request("4242424242424242", "same")).await.unwrap();
        let second = gateway.charge(&request("4242424242424242", "same")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(gateway.charge_count(), 1);
    }

    #[tokio::test]
    async fn test_full_decline_rate() {
        let gateway = SimulatedGateway::new(1.0, Duration::ZERO);
        let err = gateway.charge(&request("4242424242424242", "k1")).await.unwrap_err();
        assert!(matches!(err, GatewayFailure::Declined(_)));
    }
}
