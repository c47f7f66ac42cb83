use abstractdatabase::{Point, PointWriter, SinkError, SinkResult};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::debug;

use crate::config::InfluxConfig;
use crate::lineprotocol::encode_point;

/// Blocking-write client for the InfluxDB v2 HTTP API.
///
/// `reqwest::Client` pools connections internally, so one instance is
/// shared by every concurrent handler.
#[derive(Clone)]
pub struct InfluxClient {
    http: reqwest::Client,
    cfg: InfluxConfig,
}

impl InfluxClient {
    pub fn connect(cfg: InfluxConfig) -> SinkResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| SinkError::Unavailable(format!("http client: {e}")))?;
        Ok(Self { http, cfg })
    }

    pub fn config(&self) -> &InfluxConfig {
        &self.cfg
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.cfg.host.trim_end_matches('/'), path)
    }

    /// Checks `/health`. Called once at startup; failure is fatal for the writer.
    pub async fn health(&self) -> SinkResult<()> {
        let resp = self
            .http
            .get(self.url("/health"))
            .send()
            .await
            .map_err(map_transport)?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SinkError::Rejected {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            })
        }
    }

    /// Writes pre-encoded line protocol (one or more newline-separated lines).
    pub async fn write_lines(&self, body: String) -> SinkResult<()> {
        let resp = self
            .http
            .post(self.url("/api/v2/write"))
            .query(&[
                ("org", self.cfg.org.as_str()),
                ("bucket", self.cfg.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.cfg.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(map_transport)?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SinkError::Rejected {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            })
        }
    }
}

fn map_transport(e: reqwest::Error) -> SinkError {
    if e.is_timeout() {
        SinkError::Unavailable(format!("timed out: {e}"))
    } else {
        SinkError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl PointWriter for InfluxClient {
    fn name(&self) -> &str {
        "influxdb"
    }

    async fn write_point(&self, point: &Point) -> SinkResult<()> {
        let line = encode_point(point)?;
        debug!(bucket = %self.cfg.bucket, %line, "writing point");
        self.write_lines(line).await
    }
}
