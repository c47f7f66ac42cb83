use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_INFLUXDB_HOST: &str = "http://influxdb:8086";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("InfluxDB {0} is not set (INFLUXDB_TOKEN, INFLUXDB_ORG and INFLUXDB_BUCKET are required)")]
    Missing(&'static str),
}

#[derive(Clone, Debug)]
pub struct InfluxConfig {
    pub host: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
}

impl InfluxConfig {
    /// Builds a config from optional credentials. Any missing or blank
    /// credential is an error; the writer cannot start without them.
    pub fn from_parts(
        host: Option<String>,
        token: Option<String>,
        org: Option<String>,
        bucket: Option<String>,
    ) -> Result<Self, ConfigError> {
        fn required(v: Option<String>, name: &'static str) -> Result<String, ConfigError> {
            v.filter(|s| !s.trim().is_empty()).ok_or(ConfigError::Missing(name))
        }

        Ok(Self {
            host: host
                .filter(|h| !h.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_INFLUXDB_HOST.to_string()),
            token: required(token, "token")?,
            org: required(org, "organization")?,
            bucket: required(bucket, "bucket")?,
            timeout: Duration::from_secs(10),
        })
    }
}
