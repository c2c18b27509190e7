use async_trait::async_trait;
use chrono::Duration as TtlDuration;
use skyhold_booking::{
    AttemptOutcome, BookingLifecycle, BookingState, ExpiryReaper, HoldManager, NewBooking, PaymentOrchestrator,
    SimulatedGateway,
};
use skyhold_catalog::{Flight, FlightCatalog, FlightSeed, InMemoryCatalog, OccupancyView, SeatInventory, SeatStatus};
use skyhold_core::payment::{CardDetails, ChargeRequest, GatewayFailure, GatewayReceipt, PaymentGateway};
use skyhold_core::{BookingError, ManualClock};
use skyhold_shared::{LifecycleEvent, Masked};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Gateway that plays back a fixed list of outcomes, then succeeds.
#[derive(Default)]
struct ScriptedGateway {
    script: Mutex<VecDeque<Result<GatewayReceipt, GatewayFailure>>>,
    calls: AtomicUsize,
    latency: Duration,
}

impl ScriptedGateway {
    fn with_script(outcomes: Vec<Result<GatewayReceipt, GatewayFailure>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            ..Default::default()
        }
    }

    fn slow(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<GatewayReceipt, GatewayFailure> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(GatewayReceipt {
                reference: format!("ch_{}_{}", n, request.idempotency_key),
            })
        })
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    flight: Flight,
    seat_12a: Uuid,
    seat_12b: Uuid,
    lifecycle: Arc<BookingLifecycle>,
    inventory: SeatInventory,
    payments: PaymentOrchestrator,
    reaper: ExpiryReaper,
    gateway: Arc<ScriptedGateway>,
}

fn harness_with_timeout(gateway: ScriptedGateway, gateway_timeout: Duration) -> Harness {
    let mut catalog = InMemoryCatalog::new();
    let flight = catalog
        .add_flight(FlightSeed {
            id: None,
            flight_number: "SH101".to_string(),
            origin: "New York (JFK)".to_string(),
            destination: "London (LHR)".to_string(),
            departure_date: chrono::NaiveDate::from_ymd_opt(2030, 3, 1).unwrap(),
            departure_time: chrono::NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
            price_amount: 45_000,
            currency: "USD".to_string(),
            rows: 20,
            seat_letters: "ABCDEF".to_string(),
            first_rows: 0,
            business_rows: 0,
        })
        .unwrap();
    let seat_12a = catalog.find_seat(flight.id, "12A").unwrap().id;
    let seat_12b = catalog.find_seat(flight.id, "12B").unwrap().id;
    let catalog: Arc<dyn FlightCatalog> = Arc::new(catalog);

    let clock = Arc::new(ManualClock::starting_now());
    let holds = Arc::new(HoldManager::new(clock.clone()));
    let occupancy: Arc<dyn OccupancyView> = holds.clone();
    let lifecycle = Arc::new(BookingLifecycle::new(
        catalog.clone(),
        holds,
        clock.clone(),
        TtlDuration::minutes(15),
    ));
    let gateway = Arc::new(gateway);

    Harness {
        clock,
        flight,
        seat_12a,
        seat_12b,
        inventory: SeatInventory::new(catalog, occupancy),
        payments: PaymentOrchestrator::new(lifecycle.clone(), gateway.clone(), gateway_timeout),
        reaper: ExpiryReaper::new(lifecycle.clone(), Duration::from_secs(1)),
        lifecycle,
        gateway,
    }
}

fn harness(gateway: ScriptedGateway) -> Harness {
    harness_with_timeout(gateway, Duration::from_secs(5))
}

fn passenger(flight_id: Uuid, seat_id: Uuid, name: &str) -> NewBooking {
    NewBooking {
        flight_id,
        seat_id,
        passenger_name: name.to_string(),
        passenger_email: Masked(format!("{}@example.com", name.to_lowercase().replace(' ', "."))),
        passenger_phone: Masked("+1 555 0100".to_string()),
    }
}

fn card() -> CardDetails {
    CardDetails::new("4242 4242 4242 4242", "12/39", "123")
}

#[tokio::test]
async fn test_hold_pay_confirm_scenario() {
    let h = harness(ScriptedGateway::default());
    let before = h.inventory.available_seats(h.flight.id).await.unwrap();
    assert_eq!(before, 120);

    // Passenger A holds 12A
    let booking = h.lifecycle.create(passenger(h.flight.id, h.seat_12a, "Ada Lovelace")).await.unwrap();
    assert_eq!(booking.state, BookingState::SeatHeld);

    // Passenger B is turned away
    let err = h.lifecycle.create(passenger(h.flight.id, h.seat_12a, "Bob Byte")).await.unwrap_err();
    assert!(matches!(err, BookingError::SeatUnavailable(_)));

    // A pays
    let result = h.payments.charge(booking.id, card(), None).await.unwrap();
    assert!(result.success);
    assert_eq!(result.booking.state, BookingState::Confirmed);
    assert!(result.booking.payment_reference.is_some());
    assert!(result.booking.confirmed_at.is_some());

    let seats = h.inventory.list_seats(h.flight.id).await.unwrap();
    let seat = seats.iter().find(|s| s.seat_number == "12A").unwrap();
    assert_eq!(seat.status, SeatStatus::Sold);
    assert!(!seat.is_available);
    assert_eq!(h.inventory.available_seats(h.flight.id).await.unwrap(), before - 1);

    // A sold seat stays sold long after the hold window
    h.clock.advance(TtlDuration::hours(2));
    assert_eq!(h.reaper.sweep(), 0);
    assert_eq!(h.lifecycle.get(booking.id).unwrap().state, BookingState::Confirmed);
}

#[tokio::test]
async fn test_ttl_expiry_scenario() {
    let h = harness(ScriptedGateway::default());
    let booking = h.lifecycle.create(passenger(h.flight.id, h.seat_12a, "Ada Lovelace")).await.unwrap();

    h.clock.advance(TtlDuration::minutes(15) + TtlDuration::seconds(1));
    assert_eq!(h.reaper.sweep(), 1);

    let expired = h.lifecycle.get(booking.id).unwrap();
    assert_eq!(expired.state, BookingState::Expired);
    assert!(expired.expired_at.is_some());
    assert_eq!(h.lifecycle.holds().status(h.seat_12a), SeatStatus::Free);

    let rebooked = h.lifecycle.create(passenger(h.flight.id, h.seat_12a, "Bob Byte")).await.unwrap();
    assert_eq!(rebooked.state, BookingState::SeatHeld);
}

#[tokio::test]
async fn test_decline_then_retry_scenario() {
    let h = harness(ScriptedGateway::with_script(vec![Err(GatewayFailure::Declined(
        "card_declined".to_string(),
    ))]));
    let booking = h.lifecycle.create(passenger(h.flight.id, h.seat_12a, "Ada Lovelace")).await.unwrap();

    let failed = h.payments.charge(booking.id, card(), None).await.unwrap();
    assert!(!failed.success);
    assert_eq!(failed.booking.state, BookingState::PaymentFailed);
    assert_eq!(failed.failure(), Some(BookingError::PaymentDeclined("card_declined".to_string())));
    assert_eq!(h.lifecycle.holds().status(h.seat_12a), SeatStatus::Held);
    assert_eq!(failed.booking.hold_expires_at, booking.hold_expires_at);

    h.clock.advance(TtlDuration::minutes(5));
    let retried = h.payments.charge(booking.id, card(), None).await.unwrap();
    assert!(retried.success);
    assert_eq!(retried.booking.state, BookingState::Confirmed);

    let attempts = h.lifecycle.attempts(booking.id).unwrap();
    assert_eq!(attempts.len(), 2);
    assert_ne!(attempts[0].idempotency_key, attempts[1].idempotency_key);
    assert_eq!(attempts[0].outcome, AttemptOutcome::Declined);
    assert_eq!(attempts[1].outcome, AttemptOutcome::Succeeded);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_creates_single_winner() {
    let h = harness(ScriptedGateway::default());
    let flight_id = h.flight.id;
    let seat_id = h.seat_12a;

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let lifecycle = h.lifecycle.clone();
            tokio::spawn(async move {
                lifecycle
                    .create(passenger(flight_id, seat_id, &format!("Passenger {i}")))
                    .await
            })
        })
        .collect();

    let mut wins = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => wins += 1,
            Err(e) => assert!(matches!(e, BookingError::SeatUnavailable(_))),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(h.lifecycle.list().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_payments_single_charge() {
    let h = Arc::new(harness(ScriptedGateway::slow(Duration::from_millis(50))));
    let booking_id = h
        .lifecycle
        .create(passenger(h.flight.id, h.seat_12a, "Ada Lovelace"))
        .await
        .unwrap()
        .id;

    let first = {
        let h = h.clone();
        tokio::spawn(async move { h.payments.charge(booking_id, card(), None).await })
    };
    let second = {
        let h = h.clone();
        tokio::spawn(async move { h.payments.charge(booking_id, card(), None).await })
    };

    let outcomes = [first.await.unwrap(), second.await.unwrap()];
    let successes = outcomes.iter().filter(|r| matches!(r, Ok(p) if p.success)).count();
    let rejected = outcomes
        .iter()
        .filter(|r| matches!(r, Err(BookingError::InvalidState { .. })))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(rejected, 1);
    assert_eq!(h.gateway.calls(), 1);
}

#[tokio::test]
async fn test_expired_hold_never_reaches_gateway() {
    let h = harness(ScriptedGateway::default());
    let booking = h.lifecycle.create(passenger(h.flight.id, h.seat_12a, "Ada Lovelace")).await.unwrap();

    h.clock.advance(TtlDuration::minutes(15));
    let err = h.payments.charge(booking.id, card(), None).await.unwrap_err();

    assert!(matches!(err, BookingError::HoldExpired(_)));
    assert_eq!(h.gateway.calls(), 0);
    assert_eq!(h.lifecycle.get(booking.id).unwrap().state, BookingState::Expired);
    assert!(h.lifecycle.attempts(booking.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_no_second_success_after_confirmation() {
    let h = harness(ScriptedGateway::default());
    let booking = h.lifecycle.create(passenger(h.flight.id, h.seat_12a, "Ada Lovelace")).await.unwrap();
    h.payments.charge(booking.id, card(), None).await.unwrap();

    let err = h.payments.charge(booking.id, card(), None).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidState { .. }));

    let err = h.lifecycle.cancel(booking.id).unwrap_err();
    assert!(matches!(err, BookingError::InvalidState { .. }));

    let successes = h
        .lifecycle
        .attempts(booking.id)
        .unwrap()
        .iter()
        .filter(|a| a.outcome == AttemptOutcome::Succeeded)
        .count();
    assert_eq!(successes, 1);
    assert_eq!(h.gateway.calls(), 1);
}

#[tokio::test]
async fn test_idempotent_resubmission_replays() {
    let h = harness(ScriptedGateway::default());
    let booking = h.lifecycle.create(passenger(h.flight.id, h.seat_12a, "Ada Lovelace")).await.unwrap();
    let key = Some("checkout-7f3a".to_string());

    let first = h.payments.charge(booking.id, card(), key.clone()).await.unwrap();
    let again = h.payments.charge(booking.id, card(), key).await.unwrap();

    assert!(first.success && again.success);
    assert!(again.replayed);
    assert_eq!(first.attempt.id, again.attempt.id);
    assert_eq!(h.gateway.calls(), 1);
}

#[tokio::test]
async fn test_gateway_timeout_is_recorded_as_error() {
    let h = harness_with_timeout(ScriptedGateway::slow(Duration::from_millis(500)), Duration::from_millis(20));
    let booking = h.lifecycle.create(passenger(h.flight.id, h.seat_12a, "Ada Lovelace")).await.unwrap();

    let result = h.payments.charge(booking.id, card(), None).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.attempt.outcome, AttemptOutcome::Error);
    assert!(matches!(result.failure(), Some(BookingError::PaymentGatewayError(_))));
    assert_eq!(result.booking.state, BookingState::PaymentFailed);
    assert_eq!(h.lifecycle.holds().status(h.seat_12a), SeatStatus::Held);
}

#[tokio::test]
async fn test_invalid_card_rejected_before_state_change() {
    let h = harness(ScriptedGateway::default());
    let booking = h.lifecycle.create(passenger(h.flight.id, h.seat_12a, "Ada Lovelace")).await.unwrap();

    let bad = CardDetails::new("4242 4242 4242 4241", "12/39", "123");
    let err = h.payments.charge(booking.id, bad, None).await.unwrap_err();

    assert!(matches!(err, BookingError::Validation(_)));
    assert_eq!(h.lifecycle.get(booking.id).unwrap().state, BookingState::SeatHeld);
    assert_eq!(h.gateway.calls(), 0);
}

#[tokio::test]
async fn test_cancel_frees_seat_immediately() {
    let h = harness(ScriptedGateway::default());
    let booking = h.lifecycle.create(passenger(h.flight.id, h.seat_12a, "Ada Lovelace")).await.unwrap();
    assert_eq!(h.inventory.available_seats(h.flight.id).await.unwrap(), 119);

    let cancelled = h.lifecycle.cancel(booking.id).unwrap();
    assert_eq!(cancelled.state, BookingState::Cancelled);
    assert_eq!(h.inventory.available_seats(h.flight.id).await.unwrap(), 120);

    let err = h.payments.charge(booking.id, card(), None).await.unwrap_err();
    assert!(matches!(err, BookingError::InvalidState { .. }));

    h.lifecycle
        .create(passenger(h.flight.id, h.seat_12a, "Bob Byte"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_booking_json_hides_internal_hold_id() {
    let h = harness(ScriptedGateway::default());
    let booking = h.lifecycle.create(passenger(h.flight.id, h.seat_12a, "Ada Lovelace")).await.unwrap();

    let json = serde_json::to_value(&booking).unwrap();
    assert_eq!(json["state"], "SEAT_HELD");
    assert_eq!(json["seat_number"], "12A");
    assert_eq!(json["passenger_email"], "ada.lovelace@example.com");
    assert!(json.get("hold_id").is_none());

    let debug = format!("{booking:?}");
    assert!(!debug.contains("ada.lovelace@example.com"));
}

#[tokio::test]
async fn test_reused_key_on_another_booking_charges_again() {
    let h = harness(ScriptedGateway::default());
    let gateway = Arc::new(SimulatedGateway::default());
    let payments = PaymentOrchestrator::new(h.lifecycle.clone(), gateway.clone(), Duration::from_secs(5));
    let first = h.lifecycle.create(passenger(h.flight.id, h.seat_12a, "Ada Lovelace")).await.unwrap();
    let second = h.lifecycle.create(passenger(h.flight.id, h.seat_12b, "Bob Byte")).await.unwrap();
    let key = Some("checkout-7f3a".to_string());

    let paid_first = payments.charge(first.id, card(), key.clone()).await.unwrap();
    let paid_second = payments.charge(second.id, card(), key).await.unwrap();

    assert!(paid_first.success && paid_second.success);
    assert!(!paid_second.replayed);
    assert!(paid_second.booking.payment_reference.is_some());
    assert_ne!(paid_first.booking.payment_reference, paid_second.booking.payment_reference);
    assert_eq!(gateway.charge_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_charge_and_sweep_race_has_one_winner() {
    let h = Arc::new(harness(ScriptedGateway::slow(Duration::from_millis(5))));
    let seats: Vec<Uuid> = h
        .inventory
        .list_seats(h.flight.id)
        .await
        .unwrap()
        .iter()
        .take(24)
        .map(|s| s.id)
        .collect();
    let mut events = h.lifecycle.subscribe();
    let mut confirmed = 0;

    for (i, seat_id) in seats.into_iter().enumerate() {
        let overdue = i % 2 == 1;
        let booking_id = h
            .lifecycle
            .create(passenger(h.flight.id, seat_id, "Ada Lovelace"))
            .await
            .unwrap()
            .id;
        if overdue {
            h.clock.advance(TtlDuration::minutes(15));
        }

        let cancel = {
            let h = h.clone();
            tokio::spawn(async move { h.lifecycle.cancel(booking_id) })
        };
        let charge = {
            let h = h.clone();
            tokio::spawn(async move { h.payments.charge(booking_id, card(), None).await })
        };
        let sweep = {
            let h = h.clone();
            tokio::spawn(async move { h.reaper.sweep() })
        };
        let cancelled = cancel.await.unwrap();
        let charged = charge.await.unwrap();
        let swept = sweep.await.unwrap();

        // Losers fail cleanly; cancelling an already expired booking returns it unchanged
        match &cancelled {
            Ok(b) => assert!(matches!(b.state, BookingState::Cancelled | BookingState::Expired)),
            Err(e) => assert!(matches!(e, BookingError::InvalidState { .. }), "cancel: {e:?}"),
        }
        match &charged {
            Ok(result) => assert!(result.success),
            Err(e) => assert!(
                matches!(e, BookingError::InvalidState { .. } | BookingError::HoldExpired(_)),
                "charge: {e:?}"
            ),
        }
        assert!(swept <= 1);

        let last = h.lifecycle.get(booking_id).unwrap();
        let seat = h.lifecycle.holds().status(seat_id);
        match last.state {
            BookingState::Confirmed => {
                assert!(!overdue);
                assert_eq!(seat, SeatStatus::Sold);
                confirmed += 1;
            }
            BookingState::Cancelled | BookingState::Expired => assert_eq!(seat, SeatStatus::Free),
            other => panic!("booking left in {other}"),
        }
        if overdue {
            assert_eq!(last.state, BookingState::Expired);
        }

        let mut left_held = 0;
        let mut terminal = 0;
        while let Ok(event) = events.try_recv() {
            if let LifecycleEvent::BookingTransitioned(t) = event {
                if t.booking_id != booking_id {
                    continue;
                }
                if t.from.as_deref() == Some("SEAT_HELD") {
                    left_held += 1;
                }
                if matches!(t.to.as_str(), "CONFIRMED" | "CANCELLED" | "EXPIRED") {
                    terminal += 1;
                }
            }
        }
        assert_eq!(left_held, 1);
        assert_eq!(terminal, 1);
    }

    assert_eq!(h.gateway.calls(), confirmed);
}
