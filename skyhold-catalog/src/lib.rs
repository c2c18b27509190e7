pub mod flight;
pub mod catalog;
pub mod inventory;

pub use flight::{Flight, FlightView, Seat, SeatClass, SeatStatus, SeatView};
pub use catalog::{CatalogError, FlightCatalog, FlightSeed, InMemoryCatalog};
pub use inventory::{OccupancyView, SeatInventory};
