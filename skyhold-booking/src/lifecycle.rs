use chrono::{DateTime, Duration, Utc};
use skyhold_catalog::{FlightCatalog, SeatStatus};
use skyhold_core::payment::{GatewayFailure, GatewayReceipt};
use skyhold_core::{BookingError, BookingResult, Clock};
use skyhold_shared::{BookingTransitioned, LifecycleEvent, SeatStatusChanged};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::hold::{lock, HoldManager};
use crate::models::{AttemptOutcome, Booking, BookingState, NewBooking, PaymentAttempt};

const EVENT_BUFFER: usize = 1024;

/// A booking together with every payment attempt made against it.
#[derive(Debug, Clone)]
pub struct BookingRecord {
    pub booking: Booking,
    pub attempts: Vec<PaymentAttempt>,
}

/// Result of trying to move a booking into PAYMENT_PROCESSING.
#[derive(Debug, Clone)]
pub enum PaymentStart {
    /// A fresh attempt was opened; the caller must charge and then complete it.
    Proceed { booking: Booking, attempt: PaymentAttempt },
    /// The idempotency key matched a finished attempt.
    Replay { booking: Booking, attempt: PaymentAttempt },
}

/// Owns every booking and drives it through the lifecycle state machine.
///
/// Each booking sits behind its own mutex. Whenever a booking and a seat are
/// both locked, the booking is taken first.
pub struct BookingLifecycle {
    catalog: Arc<dyn FlightCatalog>,
    holds: Arc<HoldManager>,
    bookings: RwLock<HashMap<Uuid, Arc<Mutex<BookingRecord>>>>,
    clock: Arc<dyn Clock>,
    hold_ttl: Duration,
    events: broadcast::Sender<LifecycleEvent>,
}

impl BookingLifecycle {
    pub fn new(
        catalog: Arc<dyn FlightCatalog>,
        holds: Arc<HoldManager>,
        clock: Arc<dyn Clock>,
        hold_ttl: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            catalog,
            holds,
            bookings: RwLock::new(HashMap::new()),
            clock,
            hold_ttl,
            events,
        }
    }

    pub fn holds(&self) -> &Arc<HoldManager> {
        &self.holds
    }

    pub fn hold_ttl(&self) -> Duration {
        self.hold_ttl
    }

    /// Subscribe to booking and seat transitions
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Hold a seat and open a booking in SEAT_HELD.
    pub async fn create(&self, request: NewBooking) -> BookingResult<Booking> {
        // 1. Validate passenger input
        request.validate()?;

        // 2. Resolve flight and seat from the catalog
        let flight = self
            .catalog
            .get_flight(request.flight_id)
            .await?
            .ok_or_else(|| BookingError::not_found("flight", request.flight_id))?;
        let seat = self
            .catalog
            .get_seat(request.seat_id)
            .await?
            .ok_or_else(|| BookingError::not_found("seat", request.seat_id))?;
        if seat.flight_id != flight.id {
            return Err(BookingError::Validation(format!(
                "seat {} does not belong to flight {}",
                seat.seat_number, flight.flight_number
            )));
        }

        // 3. Claim the seat
        let booking_id = Uuid::new_v4();
        let hold = match self.holds.acquire(seat.id, booking_id, self.hold_ttl) {
            Ok(hold) => hold,
            Err(e) => {
                tracing::warn!(seat_id = %seat.id, seat_number = %seat.seat_number, "Seat conflict on create");
                return Err(e);
            }
        };

        // 4. Record the booking
        let booking = Booking {
            id: booking_id,
            flight_id: flight.id,
            seat_id: seat.id,
            seat_number: seat.seat_number,
            passenger_name: request.passenger_name.trim().to_string(),
            passenger_email: request.passenger_email,
            passenger_phone: request.passenger_phone,
            state: BookingState::SeatHeld,
            hold_id: Some(hold.id),
            hold_expires_at: Some(hold.expires_at),
            payment_amount: flight.price_amount,
            currency: flight.currency,
            payment_reference: None,
            created_at: hold.created_at,
            updated_at: hold.created_at,
            confirmed_at: None,
            cancelled_at: None,
            expired_at: None,
        };

        {
            let mut bookings = self.bookings.write().unwrap_or_else(PoisonError::into_inner);
            bookings.insert(
                booking_id,
                Arc::new(Mutex::new(BookingRecord {
                    booking: booking.clone(),
                    attempts: Vec::new(),
                })),
            );
        }

        tracing::info!(
            booking_id = %booking_id,
            seat_number = %booking.seat_number,
            hold_expires_at = %hold.expires_at,
            "Seat held"
        );
        self.publish_seat(&booking, SeatStatus::Held, hold.created_at);
        self.publish_transition(&booking, None, None, hold.created_at);

        Ok(booking)
    }

    /// Current snapshot of a booking, with any due expiry applied first.
    pub fn get(&self, booking_id: Uuid) -> BookingResult<Booking> {
        let record = self.record(booking_id)?;
        let mut guard = lock(&record);
        self.expire_locked(&mut guard, self.clock.now());
        Ok(guard.booking.clone())
    }

    /// All bookings, newest first
    pub fn list(&self) -> Vec<Booking> {
        let now = self.clock.now();
        let mut bookings: Vec<Booking> = self
            .records()
            .iter()
            .map(|record| {
                let mut guard = lock(record);
                self.expire_locked(&mut guard, now);
                guard.booking.clone()
            })
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        bookings
    }

    /// Payment attempts recorded against a booking, oldest first
    pub fn attempts(&self, booking_id: Uuid) -> BookingResult<Vec<PaymentAttempt>> {
        let record = self.record(booking_id)?;
        let guard = lock(&record);
        Ok(guard.attempts.clone())
    }

    /// Cancel a booking that has not been paid for.
    ///
    /// Already CANCELLED or EXPIRED bookings are returned unchanged. CONFIRMED
    /// bookings, and bookings with a charge in flight, cannot be cancelled.
    pub fn cancel(&self, booking_id: Uuid) -> BookingResult<Booking> {
        let record = self.record(booking_id)?;
        let mut guard = lock(&record);
        let now = self.clock.now();
        self.expire_locked(&mut guard, now);

        let booking = &mut guard.booking;
        match booking.state {
            BookingState::Cancelled | BookingState::Expired => return Ok(booking.clone()),
            BookingState::Confirmed | BookingState::PaymentProcessing => {
                return Err(BookingError::invalid_state(booking.id, booking.state, "cancel"));
            }
            BookingState::SeatHeld | BookingState::PaymentFailed => {}
        }

        let hold_id = booking.hold_id;
        let previous = booking.transition(BookingState::Cancelled, now)?;
        let released = hold_id.map_or(false, |hold_id| self.holds.release(booking.seat_id, hold_id));

        tracing::info!(booking_id = %booking.id, from = %previous, "Booking cancelled");
        if released {
            self.publish_seat(booking, SeatStatus::Free, now);
        }
        self.publish_transition(booking, Some(previous), None, now);

        Ok(booking.clone())
    }

    /// Atomically move a booking into PAYMENT_PROCESSING and open a pending attempt.
    ///
    /// Only one caller can win for a given booking; the hold is pinned so the
    /// seat survives a charge that outlasts the deadline.
    pub fn begin_payment(
        &self,
        booking_id: Uuid,
        idempotency_key: Option<String>,
        card_last_four: &str,
    ) -> BookingResult<PaymentStart> {
        let record = self.record(booking_id)?;
        let mut guard = lock(&record);
        let now = self.clock.now();

        // 1. Apply any due expiry so a replay never shows a lapsed hold
        self.expire_locked(&mut guard, now);

        // 2. Replay a finished attempt carrying the same key
        if let Some(key) = idempotency_key.as_deref() {
            if let Some(attempt) = guard.attempts.iter().find(|a| a.idempotency_key == key) {
                if attempt.outcome == AttemptOutcome::Pending {
                    return Err(BookingError::invalid_state(
                        booking_id,
                        guard.booking.state,
                        "reuse the key of a charge in flight",
                    ));
                }
                tracing::debug!(booking_id = %booking_id, idempotency_key = %key, "Replaying payment attempt");
                return Ok(PaymentStart::Replay {
                    booking: guard.booking.clone(),
                    attempt: attempt.clone(),
                });
            }
        }

        // 3. Only held or previously failed bookings may be charged
        match guard.booking.state {
            BookingState::SeatHeld | BookingState::PaymentFailed => {}
            BookingState::Expired => return Err(BookingError::HoldExpired(booking_id.to_string())),
            state => return Err(BookingError::invalid_state(booking_id, state, "submit payment")),
        }

        // 4. Pin the hold for the duration of the charge
        let pinned = guard
            .booking
            .hold_id
            .map_or(false, |hold_id| self.holds.pin(guard.booking.seat_id, hold_id));
        if !pinned {
            self.force_expire(&mut guard, now);
            return Err(BookingError::HoldExpired(booking_id.to_string()));
        }

        // 5. Transition and record the pending attempt
        let record = &mut *guard;
        let previous = record.booking.transition(BookingState::PaymentProcessing, now)?;
        let key = idempotency_key.unwrap_or_else(|| Uuid::new_v4().to_string());
        let attempt = PaymentAttempt::pending(booking_id, key, record.booking.payment_amount, card_last_four, now);
        record.attempts.push(attempt.clone());

        tracing::info!(booking_id = %booking_id, attempt_id = %attempt.id, "Payment processing");
        self.publish_transition(&record.booking, Some(previous), None, now);

        Ok(PaymentStart::Proceed {
            booking: record.booking.clone(),
            attempt,
        })
    }

    /// Reconcile a gateway outcome into the booking opened by `begin_payment`.
    pub fn complete_payment(
        &self,
        booking_id: Uuid,
        attempt_id: Uuid,
        outcome: Result<GatewayReceipt, GatewayFailure>,
    ) -> BookingResult<(Booking, PaymentAttempt)> {
        let record = self.record(booking_id)?;
        let mut guard = lock(&record);
        let now = self.clock.now();
        let record = &mut *guard;

        if record.booking.state != BookingState::PaymentProcessing {
            return Err(BookingError::invalid_state(booking_id, record.booking.state, "complete payment"));
        }
        let Some(index) = record
            .attempts
            .iter()
            .position(|a| a.id == attempt_id && a.outcome == AttemptOutcome::Pending)
        else {
            return Err(BookingError::not_found("payment attempt", attempt_id));
        };

        let seat_id = record.booking.seat_id;
        let hold_id = record.booking.hold_id;
        record.attempts[index].resolve(&outcome, now);

        match outcome {
            Ok(receipt) => {
                let sold = hold_id.map_or(false, |hold_id| self.holds.convert_to_sale(seat_id, hold_id));
                if !sold {
                    // A pinned hold cannot lapse, so this means the seat table was tampered with
                    tracing::error!(booking_id = %booking_id, reference = %receipt.reference, "Charged booking lost its seat hold");
                    let attempt = &mut record.attempts[index];
                    attempt.outcome = AttemptOutcome::Error;
                    attempt.failure_reason = Some("seat hold lost during charge".to_string());
                    self.fail_payment(record, now);
                } else {
                    record.booking.payment_reference = Some(receipt.reference.clone());
                    let previous = record.booking.transition(BookingState::Confirmed, now)?;
                    tracing::info!(booking_id = %booking_id, reference = %receipt.reference, "Booking confirmed");
                    self.publish_seat(&record.booking, SeatStatus::Sold, now);
                    self.publish_transition(&record.booking, Some(previous), None, now);
                }
            }
            Err(failure) => {
                if let Some(hold_id) = hold_id {
                    self.holds.unpin(seat_id, hold_id);
                }
                tracing::warn!(booking_id = %booking_id, reason = %failure, "Payment failed");
                self.fail_payment(record, now);
            }
        }

        Ok((record.booking.clone(), record.attempts[index].clone()))
    }

    /// Expire every booking whose hold deadline has passed. Returns how many moved.
    pub fn expire_overdue(&self) -> usize {
        let now = self.clock.now();
        self.records()
            .iter()
            .filter(|record| {
                let mut guard = lock(record);
                self.expire_locked(&mut guard, now)
            })
            .count()
    }

    fn record(&self, booking_id: Uuid) -> BookingResult<Arc<Mutex<BookingRecord>>> {
        let bookings = self.bookings.read().unwrap_or_else(PoisonError::into_inner);
        bookings
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| BookingError::not_found("booking", booking_id))
    }

    fn records(&self) -> Vec<Arc<Mutex<BookingRecord>>> {
        let bookings = self.bookings.read().unwrap_or_else(PoisonError::into_inner);
        bookings.values().cloned().collect()
    }

    fn fail_payment(&self, record: &mut BookingRecord, now: DateTime<Utc>) {
        let reason = record.attempts.last().and_then(|a| a.failure_reason.clone());
        if let Ok(previous) = record.booking.transition(BookingState::PaymentFailed, now) {
            self.publish_transition(&record.booking, Some(previous), reason, now);
        }
        // The deadline may have passed while the charge was pinned
        self.expire_locked(record, now);
    }

    /// Apply the deadline-passed transition if it is due. Shared by reads and the reaper.
    fn expire_locked(&self, record: &mut BookingRecord, now: DateTime<Utc>) -> bool {
        if !record.booking.is_overdue(now) {
            return false;
        }
        self.force_expire(record, now)
    }

    fn force_expire(&self, record: &mut BookingRecord, now: DateTime<Utc>) -> bool {
        let booking = &mut record.booking;
        let hold_id = booking.hold_id;
        let Ok(previous) = booking.transition(BookingState::Expired, now) else {
            return false;
        };
        let released = hold_id.map_or(false, |hold_id| self.holds.release(booking.seat_id, hold_id));

        tracing::warn!(booking_id = %booking.id, seat_number = %booking.seat_number, from = %previous, "Seat hold expired");
        if released {
            self.publish_seat(booking, SeatStatus::Free, now);
        }
        self.publish_transition(booking, Some(previous), Some("hold expired".to_string()), now);
        true
    }

    fn publish_seat(&self, booking: &Booking, status: SeatStatus, at: DateTime<Utc>) {
        let _ = self.events.send(LifecycleEvent::SeatStatusChanged(SeatStatusChanged {
            flight_id: booking.flight_id,
            seat_id: booking.seat_id,
            seat_number: booking.seat_number.clone(),
            status: status.as_str().to_string(),
            booking_id: booking.id,
            at: at.timestamp_millis(),
        }));
    }

    fn publish_transition(
        &self,
        booking: &Booking,
        from: Option<BookingState>,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) {
        let _ = self.events.send(LifecycleEvent::BookingTransitioned(BookingTransitioned {
            booking_id: booking.id,
            flight_id: booking.flight_id,
            seat_id: booking.seat_id,
            from: from.map(|s| s.as_str().to_string()),
            to: booking.state.as_str().to_string(),
            reason,
            at: at.timestamp_millis(),
        }));
    }
}
