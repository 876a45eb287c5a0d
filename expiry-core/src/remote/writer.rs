use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use prometheus::proto::{MetricFamily, MetricType};
use prometheus::Registry;
use prost::Message;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder};
use tracing::{debug, info, instrument};

use super::proto::{Label, Sample, TimeSeries, WriteRequest};
use crate::collector::namespace_prefix;
use crate::config::RemoteStoreConfig;
use crate::error::{ExpiryError, Result};

const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

const METRIC_NAME_LABEL: &str = "__name__";
const DOMAIN_LABEL: &str = "domain";

/// Ships this exporter's metric families to a remote-write endpoint.
///
/// Basic-auth credentials are attached to every request as a default header.
pub struct RemoteWriter {
    http: Client,
    url: String,
}

impl RemoteWriter {
    pub fn new(config: &RemoteStoreConfig) -> Result<Self> {
        Self::with_builder(config, Client::builder())
    }

    pub fn with_builder(config: &RemoteStoreConfig, builder: ClientBuilder) -> Result<Self> {
        if config.user.is_empty() || config.pass.is_empty() {
            return Err(ExpiryError::Other(
                "remote store user and pass must both be set".to_string(),
            ));
        }

        let credentials = STANDARD.encode(format!("{}:{}", config.user, config.pass));
        let mut auth = HeaderValue::from_str(&format!("Basic {}", credentials))
            .map_err(|e| ExpiryError::Other(format!("invalid remote store credentials: {}", e)))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = builder
            .timeout(WRITE_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            url: config.url.clone(),
        })
    }

    /// Gathers `registry` and submits every exporter series as one request.
    ///
    /// Returns the number of series sent.
    #[instrument(skip(self, registry), fields(url = %self.url))]
    pub async fn write(&self, registry: &Registry) -> Result<usize> {
        let families = registry.gather();
        let series = build_series(&families, &namespace_prefix(), Utc::now());
        let count = series.len();

        let body = encode_request(WriteRequest { timeseries: series })?;
        debug!(series = count, bytes = body.len(), "Sending remote write request");

        let response = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/x-protobuf")
            .header(CONTENT_ENCODING, "snappy")
            .header("X-Prometheus-Remote-Write-Version", "0.1.0")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExpiryError::RemoteWrite {
                status: status.as_u16(),
                body,
            });
        }

        info!(series = count, "remote write accepted");
        Ok(count)
    }
}

/// Converts gathered families into remote-write series.
///
/// Only families whose name contains `namespace` (normally `domain_`) are
/// kept. Each metric becomes one series labelled with `__name__` and its own
/// `domain` label, carrying a single sample stamped `now`.
pub fn build_series(
    families: &[MetricFamily],
    namespace: &str,
    now: DateTime<Utc>,
) -> Vec<TimeSeries> {
    let timestamp = now.timestamp_millis();
    let mut series = Vec::new();

    for family in families {
        let name = family.get_name();
        if !name.contains(namespace) || family.get_metric().is_empty() {
            continue;
        }

        for metric in family.get_metric() {
            let value = match family.get_field_type() {
                MetricType::GAUGE => metric.get_gauge().get_value(),
                MetricType::COUNTER => metric.get_counter().get_value(),
                MetricType::UNTYPED => metric.get_untyped().get_value(),
                other => {
                    debug!(family = name, kind = ?other, "Skipping unsupported metric type");
                    continue;
                }
            };

            let Some(domain) = metric
                .get_label()
                .iter()
                .find(|l| l.get_name() == DOMAIN_LABEL)
                .map(|l| l.get_value())
                .filter(|v| !v.is_empty())
            else {
                continue;
            };

            series.push(TimeSeries {
                labels: vec![
                    Label::new(METRIC_NAME_LABEL, name),
                    Label::new(DOMAIN_LABEL, domain),
                ],
                samples: vec![Sample { value, timestamp }],
            });
        }
    }

    series
}

fn encode_request(request: WriteRequest) -> Result<Vec<u8>> {
    let raw = request.encode_to_vec();
    Ok(snap::raw::Encoder::new().compress_vec(&raw)?)
}
