use uuid::Uuid;

/// A seat moved between FREE, HELD and SOLD.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct SeatStatusChanged {
    pub flight_id: Uuid,
    pub seat_id: Uuid,
    pub seat_number: String,
    pub status: String,
    pub booking_id: Uuid,
    pub at: i64,
}

/// A booking crossed an edge of the lifecycle state machine.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingTransitioned {
    pub booking_id: Uuid,
    pub flight_id: Uuid,
    pub seat_id: Uuid,
    pub from: Option<String>,
    pub to: String,
    pub reason: Option<String>,
    pub at: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    SeatStatusChanged(SeatStatusChanged),
    BookingTransitioned(BookingTransitioned),
}

impl LifecycleEvent {
    /// Partition key for downstream consumers: flight for seat events, booking otherwise.
    pub fn key(&self) -> Uuid {
        match self {
            LifecycleEvent::SeatStatusChanged(e) => e.flight_id,
            LifecycleEvent::BookingTransitioned(e) => e.booking_id,
        }
    }

    pub fn flight_id(&self) -> Uuid {
        match self {
            LifecycleEvent::SeatStatusChanged(e) => e.flight_id,
            LifecycleEvent::BookingTransitioned(e) => e.flight_id,
        }
    }
}
