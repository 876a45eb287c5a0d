use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use super::types::{BootstrapRegistry, RdapDomain};
use crate::deadline::Deadline;
use crate::error::{ExpiryError, Result};
use crate::lookup::ExpiryClient;
use crate::validation::{domain_suffixes, normalize_domain};

const IANA_BOOTSTRAP_DNS: &str = "https://data.iana.org/rdap/dns.json";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Structured registration-data lookups.
///
/// The IANA bootstrap registry is fetched once per client and maps each TLD to
/// its authoritative RDAP service. The host hint is not used: RDAP discovers
/// its own endpoint.
#[derive(Debug)]
pub struct RdapClient {
    http: Client,
    bootstrap_url: String,
    services: OnceCell<HashMap<String, String>>,
}

impl RdapClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(concat!("domain-exporter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_http_client(http))
    }

    pub fn with_http_client(http: Client) -> Self {
        Self {
            http,
            bootstrap_url: IANA_BOOTSTRAP_DNS.to_string(),
            services: OnceCell::new(),
        }
    }

    pub fn with_bootstrap_url(mut self, url: impl Into<String>) -> Self {
        self.bootstrap_url = url.into();
        self
    }

    async fn services(&self) -> Result<&HashMap<String, String>> {
        self.services
            .get_or_try_init(|| self.load_bootstrap())
            .await
    }

    async fn load_bootstrap(&self) -> Result<HashMap<String, String>> {
        debug!(url = %self.bootstrap_url, "Loading RDAP bootstrap data");

        let response = self.http.get(&self.bootstrap_url).send().await?;
        if !response.status().is_success() {
            return Err(ExpiryError::RdapBootstrapError(format!(
                "bootstrap request failed with status {}",
                response.status()
            )));
        }

        let registry: BootstrapRegistry = response.json().await?;
        let services = parse_dns_services(registry);

        debug!(dns_entries = services.len(), "RDAP bootstrap loaded");
        Ok(services)
    }

    fn base_url_for<'a>(
        services: &'a HashMap<String, String>,
        domain: &str,
    ) -> Option<&'a String> {
        domain_suffixes(domain).find_map(|suffix| services.get(suffix))
    }

    #[instrument(skip(self, deadline), fields(domain = %domain))]
    pub async fn lookup_domain(&self, deadline: &Deadline, domain: &str) -> Result<RdapDomain> {
        let domain = normalize_domain(domain)?;
        let services = deadline.run(self.services()).await?;

        let base_url = Self::base_url_for(services, &domain).ok_or_else(|| {
            ExpiryError::RdapBootstrapError(format!("No RDAP server for {}", domain))
        })?;

        let url = format!("{}domain/{}", ensure_trailing_slash(base_url), domain);
        debug!(url = %url, "Querying RDAP");

        deadline
            .run(async {
                let response = self
                    .http
                    .get(&url)
                    .header("Accept", "application/rdap+json")
                    .send()
                    .await?;

                match response.status() {
                    StatusCode::NOT_FOUND => Err(ExpiryError::DomainNotFound(domain.clone())),
                    status if !status.is_success() => Err(ExpiryError::RdapError(format!(
                        "RDAP query failed with status {}",
                        status
                    ))),
                    _ => Ok(response.json::<RdapDomain>().await?),
                }
            })
            .await
    }
}

#[async_trait]
impl ExpiryClient for RdapClient {
    async fn expire_time(
        &self,
        deadline: &Deadline,
        domain: &str,
        _host: Option<&str>,
    ) -> Result<DateTime<Utc>> {
        let record = self.lookup_domain(deadline, domain).await?;
        debug!(
            ldh_name = record.ldh_name.as_deref().unwrap_or(domain),
            "RDAP record retrieved"
        );
        record
            .expiration()
            .ok_or_else(|| ExpiryError::RdapNoExpiry(domain.to_string()))
    }
}

fn parse_dns_services(registry: BootstrapRegistry) -> HashMap<String, String> {
    let mut services = HashMap::new();

    for service in registry.services {
        if service.len() < 2 {
            continue;
        }
        let (Some(tlds), Some(urls)) = (service[0].as_array(), service[1].as_array()) else {
            continue;
        };
        // Prefer an https endpoint when the registry lists several.
        let url = urls
            .iter()
            .filter_map(|u| u.as_str())
            .find(|u| u.starts_with("https://"))
            .or_else(|| urls.first().and_then(|u| u.as_str()));

        if let Some(url) = url {
            for tld in tlds.iter().filter_map(|t| t.as_str()) {
                services.insert(tld.to_lowercase(), url.to_string());
            }
        }
    }

    services
}

fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}
