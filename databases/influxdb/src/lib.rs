pub mod config;
pub mod influxclient;
pub mod lineprotocol;

pub use config::{ConfigError, InfluxConfig, DEFAULT_INFLUXDB_HOST};
pub use influxclient::InfluxClient;
