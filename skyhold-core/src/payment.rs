use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use skyhold_shared::Masked;
use uuid::Uuid;

use crate::BookingError;

/// Card data as submitted by the client. Number and CVV never appear in logs.
#[derive(Debug, Clone, Deserialize)]
pub struct CardDetails {
    pub card_number: Masked<String>,
    pub expiry_date: String, // MM/YY
    pub cvv: Masked<String>,
}

impl CardDetails {
    /// Builds card details, dropping the spaces and dashes people type into card fields.
    pub fn new(card_number: &str, expiry_date: &str, cvv: &str) -> Self {
        let digits: String = card_number
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        Self {
            card_number: Masked(digits),
            expiry_date: expiry_date.trim().to_string(),
            cvv: Masked(cvv.trim().to_string()),
        }
    }

    pub fn validate(&self) -> Result<(), BookingError> {
        let number = self.card_number.expose();
        if number.len() < 12 || number.len() > 19 || !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(BookingError::Validation("card_number must be 12-19 digits".into()));
        }
        if !luhn_valid(number) {
            return Err(BookingError::Validation("card_number failed checksum".into()));
        }
        if self.expiry().is_none() {
            return Err(BookingError::Validation("expiry_date must be MM/YY".into()));
        }
        let cvv = self.cvv.expose();
        if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|c| c.is_ascii_digit()) {
            return Err(BookingError::Validation("cvv must be 3 or 4 digits".into()));
        }
        Ok(())
    }

    /// `(month, year)` parsed from `MM/YY`.
    pub fn expiry(&self) -> Option<(u32, i32)> {
        let (mm, yy) = self.expiry_date.split_once('/')?;
        if mm.len() != 2 || yy.len() != 2 {
            return None;
        }
        let month: u32 = mm.parse().ok()?;
        let year: i32 = yy.parse().ok()?;
        if !(1..=12).contains(&month) {
            return None;
        }
        Some((month, 2000 + year))
    }

    /// Cards are good through the last day of their expiry month.
    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        match self.expiry() {
            Some((month, year)) => (year, month) < (today.year(), today.month()),
            None => true,
        }
    }
}

fn luhn_valid(number: &str) -> bool {
    let mut sum = 0;
    for (i, c) in number.chars().rev().enumerate() {
        let Some(mut digit) = c.to_digit(10) else {
            return false;
        };
        if i % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    sum % 10 == 0
}

/// One call to the gateway. The idempotency key is unique per attempt across all bookings.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub idempotency_key: String,
    pub booking_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub card: CardDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayReceipt {
    pub reference: String,
}

/// Decline is a definitive no; `Unavailable` is ambiguous (timeouts, 5xx) and is not retried here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayFailure {
    #[error("declined: {0}")]
    Declined(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<GatewayFailure> for BookingError {
    fn from(failure: GatewayFailure) -> Self {
        match failure {
            GatewayFailure::Declined(reason) => BookingError::PaymentDeclined(reason),
            GatewayFailure::Unavailable(reason) => BookingError::PaymentGatewayError(reason),
        }
    }
}

/// The external payment network, reduced to one call.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> Result<GatewayReceipt, GatewayFailure>;
}
