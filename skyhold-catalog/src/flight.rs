use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cabin a seat belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatClass {
    Economy,
    Business,
    First,
}

/// Derived occupancy of a seat. Never stored on the seat itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Free,
    Held,
    Sold,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Free => "FREE",
            SeatStatus::Held => "HELD",
            SeatStatus::Sold => "SOLD",
        }
    }
}

impl std::fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduled flight, owned by the catalog. Read-only to the booking core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flight {
    pub id: Uuid,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub price_amount: i64, // minor units
    pub currency: String,
    pub total_seats: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Seat {
    pub id: Uuid,
    pub flight_id: Uuid,
    pub seat_number: String,
    pub seat_class: SeatClass,
}

impl Seat {
    /// Sort key: row number first, then the seat letter ("2A" before "10A").
    pub fn position(&self) -> (u32, String) {
        let digits: String = self.seat_number.chars().take_while(|c| c.is_ascii_digit()).collect();
        let row = digits.parse().unwrap_or(u32::MAX);
        (row, self.seat_number[digits.len()..].to_string())
    }
}

/// Flight as served to clients, with live availability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightView {
    #[serde(flatten)]
    pub flight: Flight,
    pub available_seats: u32,
}

/// Seat as served to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatView {
    pub id: Uuid,
    pub flight_id: Uuid,
    pub seat_number: String,
    pub seat_class: SeatClass,
    pub status: SeatStatus,
    pub is_available: bool,
}

impl SeatView {
    pub fn new(seat: Seat, status: SeatStatus) -> Self {
        Self {
            id: seat.id,
            flight_id: seat.flight_id,
            seat_number: seat.seat_number,
            seat_class: seat.seat_class,
            status,
            is_available: status == SeatStatus::Free,
        }
    }
}
