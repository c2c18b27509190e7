use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use skyhold_core::BookingError;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use uuid::Uuid;

use crate::flight::{Flight, Seat, SeatClass};

/// Read side of the flight catalog. Catalog administration lives elsewhere;
/// the booking core only looks flights and seats up.
#[async_trait]
pub trait FlightCatalog: Send + Sync {
    async fn list_flights(&self) -> Result<Vec<Flight>, CatalogError>;

    async fn get_flight(&self, id: Uuid) -> Result<Option<Flight>, CatalogError>;

    /// Seats of a flight ordered by row then letter; `None` if the flight is unknown.
    async fn list_seats(&self, flight_id: Uuid) -> Result<Option<Vec<Seat>>, CatalogError>;

    async fn get_seat(&self, seat_id: Uuid) -> Result<Option<Seat>, CatalogError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Invalid catalog seed: {0}")]
    InvalidSeed(String),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

impl From<CatalogError> for BookingError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound { entity, id } => BookingError::not_found(entity, id),
            other => BookingError::Internal(other.to_string()),
        }
    }
}

/// One scheduled flight in a seed file. Seats are generated as rows x letters.
#[derive(Debug, Clone, Deserialize)]
pub struct FlightSeed {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub price_amount: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_rows")]
    pub rows: u32,
    #[serde(default = "default_letters")]
    pub seat_letters: String,
    #[serde(default)]
    pub first_rows: u32,
    #[serde(default)]
    pub business_rows: u32,
}

fn default_currency() -> String { "USD".to_string() }
fn default_rows() -> u32 { 10 }
fn default_letters() -> String { "ABCDEF".to_string() }

impl FlightSeed {
    fn class_for_row(&self, row: u32) -> SeatClass {
        if row <= self.first_rows {
            SeatClass::First
        } else if row <= self.first_rows + self.business_rows {
            SeatClass::Business
        } else {
            SeatClass::Economy
        }
    }
}

/// Catalog held in memory, loaded once at startup.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    flights: HashMap<Uuid, Flight>,
    flight_order: Vec<Uuid>,
    seats: HashMap<Uuid, Seat>,
    seats_by_flight: HashMap<Uuid, Vec<Uuid>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seeds(seeds: Vec<FlightSeed>) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for seed in seeds {
            catalog.add_flight(seed)?;
        }
        Ok(catalog)
    }

    /// Parse a JSON array of [`FlightSeed`]s.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let seeds: Vec<FlightSeed> =
            serde_json::from_str(json).map_err(|e| CatalogError::InvalidSeed(e.to_string()))?;
        Self::from_seeds(seeds)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::InvalidSeed(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// A small schedule for local runs when no seed file is configured.
    pub fn demo() -> Self {
        let first_day = Utc::now().date_naive() + Duration::days(7);
        let routes = [
            ("SH101", "New York (JFK)", "London (LHR)", (8, 30), 45_000),
            ("SH202", "London (LHR)", "Paris (CDG)", (13, 15), 12_000),
            ("SH303", "Paris (CDG)", "Tokyo (HND)", (22, 5), 98_000),
        ];

        let mut catalog = Self::new();
        for (i, (number, origin, destination, (hour, minute), price)) in routes.into_iter().enumerate() {
            let Some(departure_time) = NaiveTime::from_hms_opt(hour, minute, 0) else {
                continue;
            };
            let seed = FlightSeed {
                id: None,
                flight_number: number.to_string(),
                origin: origin.to_string(),
                destination: destination.to_string(),
                departure_date: first_day + Duration::days(i as i64),
                departure_time,
                price_amount: price,
                currency: default_currency(),
                rows: default_rows(),
                seat_letters: default_letters(),
                first_rows: 0,
                business_rows: 2,
            };
            if let Err(e) = catalog.add_flight(seed) {
                tracing::warn!(flight_number = number, error = %e, "Skipping demo flight");
            }
        }
        catalog
    }

    pub fn add_flight(&mut self, seed: FlightSeed) -> Result<Flight, CatalogError> {
        if seed.rows == 0 || seed.seat_letters.is_empty() {
            return Err(CatalogError::InvalidSeed(format!(
                "flight {} has no seats",
                seed.flight_number
            )));
        }
        let mut seen = HashSet::new();
        if let Some(letter) = seed.seat_letters.chars().find(|c| !seen.insert(*c)) {
            return Err(CatalogError::InvalidSeed(format!(
                "flight {} repeats seat letter {}",
                seed.flight_number, letter
            )));
        }
        if let Some(id) = seed.id.filter(|id| self.flights.contains_key(id)) {
            return Err(CatalogError::InvalidSeed(format!("duplicate flight id {}", id)));
        }
        if self.flights.values().any(|f| f.flight_number == seed.flight_number) {
            return Err(CatalogError::InvalidSeed(format!(
                "duplicate flight number {}",
                seed.flight_number
            )));
        }

        let flight_id = seed.id.unwrap_or_else(Uuid::new_v4);
        let letters: Vec<char> = seed.seat_letters.chars().collect();
        let mut seat_ids = Vec::with_capacity(seed.rows as usize * letters.len());

        for row in 1..=seed.rows {
            for letter in &letters {
                let seat = Seat {
                    id: Uuid::new_v4(),
                    flight_id,
                    seat_number: format!("{}{}", row, letter),
                    seat_class: seed.class_for_row(row),
                };
                seat_ids.push(seat.id);
                self.seats.insert(seat.id, seat);
            }
        }

        let flight = Flight {
            id: flight_id,
            flight_number: seed.flight_number,
            origin: seed.origin,
            destination: seed.destination,
            departure_date: seed.departure_date,
            departure_time: seed.departure_time,
            price_amount: seed.price_amount,
            currency: seed.currency,
            total_seats: seat_ids.len() as u32,
        };

        self.flights.insert(flight_id, flight.clone());
        self.flight_order.push(flight_id);
        self.seats_by_flight.insert(flight_id, seat_ids);
        Ok(flight)
    }

    /// Every seat id in the catalog.
    pub fn seat_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.seats.keys().copied()
    }

    /// Look up a seat by flight and seat number, e.g. `"12A"`.
    pub fn find_seat(&self, flight_id: Uuid, seat_number: &str) -> Option<&Seat> {
        self.seats_by_flight
            .get(&flight_id)?
            .iter()
            .filter_map(|id| self.seats.get(id))
            .find(|s| s.seat_number == seat_number)
    }
}

#[async_trait]
impl FlightCatalog for InMemoryCatalog {
    async fn list_flights(&self) -> Result<Vec<Flight>, CatalogError> {
        let mut flights: Vec<Flight> = self
            .flight_order
            .iter()
            .filter_map(|id| self.flights.get(id).cloned())
            .collect();
        flights.sort_by(|a, b| {
            (a.departure_date, a.departure_time).cmp(&(b.departure_date, b.departure_time))
        });
        Ok(flights)
    }

    async fn get_flight(&self, id: Uuid) -> Result<Option<Flight>, CatalogError> {
        Ok(self.flights.get(&id).cloned())
    }

    async fn list_seats(&self, flight_id: Uuid) -> Result<Option<Vec<Seat>>, CatalogError> {
        let Some(ids) = self.seats_by_flight.get(&flight_id) else {
            return Ok(None);
        };
        let mut seats: Vec<Seat> = ids.iter().filter_map(|id| self.seats.get(id).cloned()).collect();
        seats.sort_by_key(|s| s.position());
        Ok(Some(seats))
    }

    async fn get_seat(&self, seat_id: Uuid) -> Result<Option<Seat>, CatalogError> {
        Ok(self.seats.get(&seat_id).cloned())
    }
}
