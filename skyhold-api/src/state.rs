use skyhold_booking::{BookingLifecycle, ExpiryReaper, HoldManager, PaymentOrchestrator};
use skyhold_catalog::{FlightCatalog, OccupancyView, SeatInventory};
use skyhold_core::payment::PaymentGateway;
use skyhold_core::Clock;
use skyhold_store::Config;
use std::sync::Arc;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub inventory: Arc<SeatInventory>,
    pub bookings: Arc<BookingLifecycle>,
    pub payments: Arc<PaymentOrchestrator>,
    pub reaper: Arc<ExpiryReaper>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Wire the booking core over a catalog, a payment gateway and a clock.
    /// Background tasks are not started here.
    pub fn new(
        catalog: Arc<dyn FlightCatalog>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Result<Self, prometheus::Error> {
        let holds = Arc::new(HoldManager::new(clock.clone()));
        let occupancy: Arc<dyn OccupancyView> = holds.clone();
        let hold_ttl = chrono::Duration::seconds(config.business_rules.seat_hold_seconds as i64);

        let bookings = Arc::new(BookingLifecycle::new(catalog.clone(), holds, clock, hold_ttl));
        let payments = Arc::new(PaymentOrchestrator::new(
            bookings.clone(),
            gateway,
            config.payment.gateway_timeout(),
        ));
        let reaper = Arc::new(ExpiryReaper::new(bookings.clone(), config.reaper.interval()));

        Ok(Self {
            inventory: Arc::new(SeatInventory::new(catalog, occupancy)),
            bookings,
            payments,
            reaper,
            metrics: Arc::new(Metrics::new()?),
        })
    }
}
