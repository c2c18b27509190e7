use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub reaper: ReaperConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Event forwarding is off unless a broker list is configured
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_seat_hold_seconds")]
    pub seat_hold_seconds: u64,
}

impl BusinessRules {
    pub fn seat_hold(&self) -> Duration {
        Duration::from_secs(self.seat_hold_seconds)
    }
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            seat_hold_seconds: default_seat_hold_seconds(),
        }
    }
}

fn default_seat_hold_seconds() -> u64 { 900 }

#[derive(Debug, Deserialize, Clone)]
pub struct ReaperConfig {
    #[serde(default = "default_reaper_interval_ms")]
    pub interval_ms: u64,
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_reaper_interval_ms(),
        }
    }
}

fn default_reaper_interval_ms() -> u64 { 1_000 }

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    #[serde(default = "default_gateway_timeout_ms")]
    pub gateway_timeout_ms: u64,
    #[serde(default)]
    pub simulated_latency_ms: u64,
    /// Share of ordinary cards the simulated gateway declines, 0.0..=1.0
    #[serde(default)]
    pub decline_rate: f64,
}

impl PaymentConfig {
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }

    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            gateway_timeout_ms: default_gateway_timeout_ms(),
            simulated_latency_ms: 0,
            decline_rate: 0.0,
        }
    }
}

fn default_gateway_timeout_ms() -> u64 { 10_000 }

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CatalogConfig {
    /// JSON array of flight seeds; the built-in demo schedule is used when unset
    pub seed_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

fn default_topic_prefix() -> String { "skyhold".to_string() }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Defaults live in the structs, so even the base file is optional
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `SKYHOLD__SERVER__PORT=9000`
            .add_source(config::Environment::with_prefix("SKYHOLD").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.business_rules.seat_hold(), Duration::from_secs(900));
        assert_eq!(config.reaper.interval(), Duration::from_secs(1));
        assert_eq!(config.payment.gateway_timeout(), Duration::from_secs(10));
        assert!(config.catalog.seed_path.is_none());
        assert!(config.kafka.is_none());
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = parse(
            r#"
            [server]
            port = 9100

            [business_rules]
            seat_hold_seconds = 60

            [payment]
            decline_rate = 0.2
            simulated_latency_ms = 150

            [kafka]
            brokers = "localhost:9092"
            "#,
        );
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.business_rules.seat_hold_seconds, 60);
        assert_eq!(config.payment.decline_rate, 0.2);
        assert_eq!(config.payment.simulated_latency(), Duration::from_millis(150));

        let kafka = config.kafka.unwrap();
        assert_eq!(kafka.brokers, "localhost:9092");
        assert_eq!(kafka.topic_prefix, "skyhold");
    }

    #[test]
    fn test_zero_reaper_interval_is_clamped() {
        let config = parse("[reaper]\ninterval_ms = 0\n");
        assert_eq!(config.reaper.interval(), Duration::from_millis(1));
    }
}
