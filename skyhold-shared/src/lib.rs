pub mod models;
pub mod pii;

pub use models::events::{BookingTransitioned, LifecycleEvent, SeatStatusChanged};
pub use pii::Masked;
