use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use skyhold_core::payment::{GatewayFailure, GatewayReceipt};
use skyhold_core::BookingError;
use skyhold_shared::Masked;
use uuid::Uuid;

/// Booking lifecycle states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingState {
    SeatHeld,
    PaymentProcessing,
    Confirmed,
    PaymentFailed,
    Cancelled,
    Expired,
}

impl BookingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingState::SeatHeld => "SEAT_HELD",
            BookingState::PaymentProcessing => "PAYMENT_PROCESSING",
            BookingState::Confirmed => "CONFIRMED",
            BookingState::PaymentFailed => "PAYMENT_FAILED",
            BookingState::Cancelled => "CANCELLED",
            BookingState::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingState::Confirmed | BookingState::Cancelled | BookingState::Expired)
    }

    /// States in which the hold deadline can still fire.
    pub fn awaits_payment(&self) -> bool {
        matches!(self, BookingState::SeatHeld | BookingState::PaymentFailed)
    }

    pub fn can_transition_to(&self, next: BookingState) -> bool {
        use BookingState::*;
        matches!(
            (self, next),
            (SeatHeld, PaymentProcessing)
                | (PaymentProcessing, Confirmed)
                | (PaymentProcessing, PaymentFailed)
                | (PaymentFailed, PaymentProcessing)
                | (SeatHeld, Cancelled)
                | (PaymentFailed, Cancelled)
                | (SeatHeld, Expired)
                | (PaymentFailed, Expired)
        )
    }

    /// Verb used in error messages when moving into this state is refused.
    fn action(&self) -> &'static str {
        match self {
            BookingState::SeatHeld => "hold seat",
            BookingState::PaymentProcessing => "submit payment",
            BookingState::Confirmed => "confirm",
            BookingState::PaymentFailed => "record payment failure",
            BookingState::Cancelled => "cancel",
            BookingState::Expired => "expire",
        }
    }
}

impl std::fmt::Display for BookingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-boxed exclusive claim on one seat for one booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hold {
    pub id: Uuid,
    pub seat_id: Uuid,
    pub booking_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Set while a charge against the hold is in flight.
    #[serde(default)]
    pub pinned: bool,
}

impl Hold {
    pub fn new(seat_id: Uuid, booking_id: Uuid, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            seat_id,
            booking_id,
            created_at: now,
            expires_at: now + ttl,
            pinned: false,
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.pinned || now < self.expires_at
    }
}

/// Client request to hold a seat for a passenger
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub flight_id: Uuid,
    pub seat_id: Uuid,
    pub passenger_name: String,
    pub passenger_email: Masked<String>,
    pub passenger_phone: Masked<String>,
}

impl NewBooking {
    pub fn validate(&self) -> Result<(), BookingError> {
        let name = self.passenger_name.trim();
        if name.is_empty() || name.chars().count() > 200 {
            return Err(BookingError::Validation("passenger_name must be 1-200 characters".into()));
        }

        let email = self.passenger_email.expose().trim();
        let looks_like_email = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.') && !domain.contains('@')
            }
            None => false,
        };
        if !looks_like_email || email.len() > 254 {
            return Err(BookingError::Validation("passenger_email is not a valid address".into()));
        }

        let phone = self.passenger_phone.expose().trim();
        if phone.is_empty() || phone.chars().count() > 20 {
            return Err(BookingError::Validation("passenger_phone must be 1-20 characters".into()));
        }
        Ok(())
    }
}

/// The record a client manipulates. Never deleted; terminal states stay for lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub flight_id: Uuid,
    pub seat_id: Uuid,
    pub seat_number: String,
    pub passenger_name: String,
    pub passenger_email: Masked<String>,
    pub passenger_phone: Masked<String>,
    pub state: BookingState,
    #[serde(skip)]
    pub hold_id: Option<Uuid>,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub payment_amount: i64,
    pub currency: String,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Apply one edge of the state machine. Returns the state left behind.
    pub fn transition(&mut self, next: BookingState, now: DateTime<Utc>) -> Result<BookingState, BookingError> {
        if !self.state.can_transition_to(next) {
            return Err(BookingError::invalid_state(self.id, self.state, next.action()));
        }

        let previous = self.state;
        self.state = next;
        self.updated_at = now;

        match next {
            BookingState::Confirmed => self.confirmed_at = Some(now),
            BookingState::Cancelled => self.cancelled_at = Some(now),
            BookingState::Expired => self.expired_at = Some(now),
            _ => {}
        }
        if next.is_terminal() {
            self.hold_id = None;
            self.hold_expires_at = None;
        }
        Ok(previous)
    }

    /// True when the hold deadline has passed and nothing has confirmed the booking.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.state.awaits_payment() && self.hold_expires_at.map_or(false, |deadline| now >= deadline)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptOutcome {
    Pending,
    Succeeded,
    Declined,
    Error,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Pending => "PENDING",
            AttemptOutcome::Succeeded => "SUCCEEDED",
            AttemptOutcome::Declined => "DECLINED",
            AttemptOutcome::Error => "ERROR",
        }
    }
}

/// One call to the payment gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub idempotency_key: String,
    pub amount: i64,
    pub card_last_four: String,
    pub outcome: AttemptOutcome,
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PaymentAttempt {
    pub fn pending(
        booking_id: Uuid,
        idempotency_key: String,
        amount: i64,
        card_last_four: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            idempotency_key,
            amount,
            card_last_four: card_last_four.to_string(),
            outcome: AttemptOutcome::Pending,
            gateway_reference: None,
            failure_reason: None,
            started_at: now,
            completed_at: None,
        }
    }

    pub fn resolve(&mut self, result: &Result<GatewayReceipt, GatewayFailure>, now: DateTime<Utc>) {
        match result {
            Ok(receipt) => {
                self.outcome = AttemptOutcome::Succeeded;
                self.gateway_reference = Some(receipt.reference.clone());
            }
            Err(GatewayFailure::Declined(reason)) => {
                self.outcome = AttemptOutcome::Declined;
                self.failure_reason = Some(reason.clone());
            }
            Err(GatewayFailure::Unavailable(reason)) => {
                self.outcome = AttemptOutcome::Error;
                self.failure_reason = Some(reason.clone());
            }
        }
        self.completed_at = Some(now);
    }

    /// The taxonomy error behind a failed attempt, if it failed.
    pub fn failure(&self) -> Option<BookingError> {
        let reason = self.failure_reason.clone().unwrap_or_default();
        match self.outcome {
            AttemptOutcome::Declined => Some(BookingError::PaymentDeclined(reason)),
            AttemptOutcome::Error => Some(BookingError::PaymentGatewayError(reason)),
            AttemptOutcome::Pending | AttemptOutcome::Succeeded => None,
        }
    }
}
