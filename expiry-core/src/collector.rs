//! Domain probing exposed through the Prometheus collector contract.
//!
//! Each collection pass probes every configured domain in order and yields
//! three gauges per domain:
//!
//! - `domain_probe_success`: 1 when the lookup returned an expiry, else 0
//! - `domain_expiry_days`: whole days until expiry, floored
//! - `domain_probe_duration_seconds`: wall-clock cost of the lookup
//!
//! `domain_expiry_days` is emitted even when the lookup failed. It is then
//! computed from the zero timestamp (`0001-01-01T00:00:00Z`) and saturates at
//! -106752; consumers gate on `domain_probe_success`.
//!
//! All lookups in a pass share one [`Deadline`] of
//! `per_domain_timeout × domain_count`. The budget is aggregate, not per
//! domain: slow early probes leave less time for later ones.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use prometheus::core::{Collector, Desc};
use prometheus::proto::{Gauge, LabelPair, Metric, MetricFamily, MetricType};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::config::Domain;
use crate::deadline::Deadline;
use crate::error::{ExpiryError, Result};
use crate::lookup::ExpiryClient;

/// Prefix shared by every metric this crate exports.
pub const NAMESPACE: &str = "domain";

/// Substring identifying this crate's families among everything gathered.
pub fn namespace_prefix() -> String {
    format!("{}_", NAMESPACE)
}

const DOMAIN_LABEL: &str = "domain";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    ProbeSuccess,
    ExpiryDays,
    ProbeDurationSeconds,
}

impl MetricKind {
    /// Emission order within one domain's observations.
    pub const ALL: [MetricKind; 3] = [
        MetricKind::ProbeSuccess,
        MetricKind::ExpiryDays,
        MetricKind::ProbeDurationSeconds,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetricKind::ProbeSuccess => "probe_success",
            MetricKind::ExpiryDays => "expiry_days",
            MetricKind::ProbeDurationSeconds => "probe_duration_seconds",
        }
    }

    pub fn fq_name(self) -> String {
        format!("{}_{}", NAMESPACE, self.name())
    }

    fn help(self) -> &'static str {
        match self {
            MetricKind::ProbeSuccess => "whether the probe was successful or not",
            MetricKind::ExpiryDays => "time in days until the domain expires",
            MetricKind::ProbeDurationSeconds => {
                "returns how long the probe took to complete in seconds"
            }
        }
    }
}

/// One gauge sample for one domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub kind: MetricKind,
    pub domain: String,
    pub value: f64,
}

/// Outcome of resolving one domain.
#[derive(Debug)]
pub struct ExpiryResult {
    /// The zero timestamp when `error` is set.
    pub timestamp: DateTime<Utc>,
    pub error: Option<ExpiryError>,
}

impl ExpiryResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn expiry_days(&self, now: DateTime<Utc>) -> f64 {
        days_until(self.timestamp, now)
    }
}

impl From<Result<DateTime<Utc>>> for ExpiryResult {
    fn from(result: Result<DateTime<Utc>>) -> Self {
        match result {
            Ok(timestamp) => Self {
                timestamp,
                error: None,
            },
            Err(e) => Self {
                timestamp: zero_time(),
                error: Some(e),
            },
        }
    }
}

/// `0001-01-01T00:00:00Z`, the timestamp reported for failed lookups.
pub fn zero_time() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

const NANOS_PER_HOUR: f64 = 3_600_000_000_000.0;

/// `floor(hours_until(expiry) / 24)`.
///
/// The interval is clamped to what fits in an `i64` of nanoseconds (about
/// ±292 years), so the zero timestamp reports -106752 days rather than its
/// true distance.
pub fn days_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let nanos = (expiry - now).num_nanoseconds().unwrap_or(if expiry < now {
        i64::MIN
    } else {
        i64::MAX
    });
    (nanos as f64 / NANOS_PER_HOUR / 24.0).floor()
}

/// The three observations for one probed domain, in emission order.
pub fn probe_observations(
    domain: &str,
    result: &ExpiryResult,
    elapsed: Duration,
    now: DateTime<Utc>,
) -> [Observation; 3] {
    let observation = |kind, value| Observation {
        kind,
        domain: domain.to_string(),
        value,
    };

    [
        observation(
            MetricKind::ProbeSuccess,
            if result.is_success() { 1.0 } else { 0.0 },
        ),
        observation(MetricKind::ExpiryDays, result.expiry_days(now)),
        observation(MetricKind::ProbeDurationSeconds, elapsed.as_secs_f64()),
    ]
}

pub struct DomainCollector {
    client: Arc<dyn ExpiryClient>,
    domains: Vec<Domain>,
    timeout: Duration,
    // Held for a whole pass so concurrent scrapes queue instead of probing twice.
    pass_lock: Mutex<()>,
    descs: HashMap<MetricKind, Desc>,
}

impl DomainCollector {
    /// `timeout` is the per-domain budget; a pass gets `timeout × domains.len()`.
    pub fn new(client: Arc<dyn ExpiryClient>, timeout: Duration, domains: Vec<Domain>) -> Result<Self> {
        let mut descs = HashMap::new();
        for kind in MetricKind::ALL {
            let desc = Desc::new(
                kind.fq_name(),
                kind.help().to_string(),
                vec![DOMAIN_LABEL.to_string()],
                HashMap::new(),
            )?;
            descs.insert(kind, desc);
        }

        Ok(Self {
            client,
            domains,
            timeout,
            pass_lock: Mutex::new(()),
            descs,
        })
    }

    /// Total budget shared by every lookup in one pass.
    pub fn pass_budget(&self) -> Duration {
        let count = u32::try_from(self.domains.len()).unwrap_or(u32::MAX);
        self.timeout.saturating_mul(count)
    }

    /// Runs one collection pass and returns `3 × domains` observations.
    ///
    /// Domains are probed sequentially. Each domain's observations are
    /// contiguous and ordered success, expiry days, duration. Lookup failures
    /// are logged and folded into the values; they never abort the pass.
    pub async fn collect_observations(&self) -> Vec<Observation> {
        let _pass = self.pass_lock.lock().await;
        let budget = self.pass_budget();
        let deadline = Deadline::after(budget);
        let mut observations = Vec::with_capacity(self.domains.len() * 3);

        debug!(domains = self.domains.len(), budget = ?budget, "Starting collection pass");

        for domain in &self.domains {
            let start = Instant::now();
            let result: ExpiryResult = self
                .client
                .expire_time(&deadline, &domain.name, domain.host.as_deref())
                .await
                .into();
            let elapsed = start.elapsed();

            if let Some(e) = &result.error {
                warn!(domain = %domain, error = %e, "failed to probe domain");
            }

            observations.extend(probe_observations(&domain.name, &result, elapsed, Utc::now()));
        }

        observations
    }

    /// Groups observations into one gauge family per metric.
    pub fn families(&self, observations: &[Observation]) -> Vec<MetricFamily> {
        MetricKind::ALL
            .iter()
            .filter_map(|kind| {
                let desc = self.descs.get(kind)?;
                let mut family = MetricFamily::default();
                family.set_name(desc.fq_name.clone());
                family.set_help(desc.help.clone());
                family.set_field_type(MetricType::GAUGE);

                for obs in observations.iter().filter(|o| o.kind == *kind) {
                    family.mut_metric().push(gauge_metric(&obs.domain, obs.value));
                }
                Some(family)
            })
            .collect()
    }
}

impl Collector for DomainCollector {
    fn desc(&self) -> Vec<&Desc> {
        [
            MetricKind::ExpiryDays,
            MetricKind::ProbeDurationSeconds,
            MetricKind::ProbeSuccess,
        ]
        .iter()
        .filter_map(|kind| self.descs.get(kind))
        .collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        match block_on_pass(self.collect_observations()) {
            Some(observations) => self.families(&observations),
            None => Vec::new(),
        }
    }
}

fn gauge_metric(domain: &str, value: f64) -> Metric {
    let mut label = LabelPair::default();
    label.set_name(DOMAIN_LABEL.to_string());
    label.set_value(domain.to_string());

    let mut gauge = Gauge::default();
    gauge.set_value(value);

    let mut metric = Metric::default();
    metric.mut_label().push(label);
    metric.set_gauge(gauge);
    metric
}

/// Drives an async pass from the synchronous `Collector::collect`.
///
/// On a multi-thread runtime the current worker is handed over with
/// `block_in_place`. Anywhere else (no runtime, or a current-thread runtime
/// that must not be blocked on itself) the pass runs on a scoped thread with a
/// private runtime.
fn block_on_pass<F>(fut: F) -> Option<F::Output>
where
    F: Future + Send,
    F::Output: Send,
{
    match Handle::try_current() {
        Ok(handle) if matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) => {
            Some(tokio::task::block_in_place(|| handle.block_on(fut)))
        }
        _ => std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => Some(runtime.block_on(fut)),
                        Err(e) => {
                            error!(error = %e, "failed to start runtime for collection pass");
                            None
                        }
                    }
                })
                .join()
                .unwrap_or_else(|_| {
                    error!("collection pass panicked");
                    None
                })
        }),
    }
}
