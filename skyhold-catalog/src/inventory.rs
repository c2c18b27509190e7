use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::{CatalogError, FlightCatalog};
use crate::flight::{FlightView, SeatStatus, SeatView};

/// Authoritative seat occupancy, backed by the hold/booking table.
pub trait OccupancyView: Send + Sync {
    fn seat_status(&self, seat_id: Uuid) -> SeatStatus;
}

/// Read-only availability view over the catalog.
///
/// Statuses are derived on every call from the occupancy table; nothing here is
/// cached, so two readers can never disagree with the hold manager.
pub struct SeatInventory {
    catalog: Arc<dyn FlightCatalog>,
    occupancy: Arc<dyn OccupancyView>,
}

impl SeatInventory {
    pub fn new(catalog: Arc<dyn FlightCatalog>, occupancy: Arc<dyn OccupancyView>) -> Self {
        Self { catalog, occupancy }
    }

    /// All flights with their current count of free seats
    pub async fn list_flights(&self) -> Result<Vec<FlightView>, CatalogError> {
        let flights = self.catalog.list_flights().await?;
        let mut views = Vec::with_capacity(flights.len());
        for flight in flights {
            let available_seats = self.available_seats(flight.id).await?;
            views.push(FlightView { flight, available_seats });
        }
        Ok(views)
    }

    pub async fn flight(&self, flight_id: Uuid) -> Result<FlightView, CatalogError> {
        let flight = self
            .catalog
            .get_flight(flight_id)
            .await?
            .ok_or(CatalogError::NotFound { entity: "flight", id: flight_id })?;
        let available_seats = self.available_seats(flight_id).await?;
        Ok(FlightView { flight, available_seats })
    }

    /// Seats of a flight in cabin order, each with its live status
    pub async fn list_seats(&self, flight_id: Uuid) -> Result<Vec<SeatView>, CatalogError> {
        let seats = self
            .catalog
            .list_seats(flight_id)
            .await?
            .ok_or(CatalogError::NotFound { entity: "flight", id: flight_id })?;

        Ok(seats
            .into_iter()
            .map(|seat| {
                let status = self.occupancy.seat_status(seat.id);
                SeatView::new(seat, status)
            })
            .collect())
    }

    pub async fn available_seats(&self, flight_id: Uuid) -> Result<u32, CatalogError> {
        let seats = self.catalog.list_seats(flight_id).await?.unwrap_or_default();
        let free = seats
            .iter()
            .filter(|s| self.occupancy.seat_status(s.id) == SeatStatus::Free)
            .count();
        Ok(free as u32)
    }
}
