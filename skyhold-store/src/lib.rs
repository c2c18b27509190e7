pub mod app_config;
pub mod events;

pub use app_config::Config;
#[cfg(feature = "kafka")]
pub use events::EventProducer;
