pub mod models;
pub mod hold;
pub mod lifecycle;
pub mod orchestrator;
pub mod reaper;

pub use models::{AttemptOutcome, Booking, BookingState, Hold, NewBooking, PaymentAttempt};
pub use hold::HoldManager;
pub use lifecycle::{BookingLifecycle, BookingRecord, PaymentStart};
pub use orchestrator::{PaymentOrchestrator, PaymentResult, SimulatedGateway};
pub use reaper::ExpiryReaper;
