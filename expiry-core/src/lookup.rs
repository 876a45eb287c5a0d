use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::deadline::Deadline;
use crate::error::{ExpiryError, Result};
use crate::rdap::RdapClient;
use crate::whois::WhoisClient;

/// A lookup protocol able to report when a domain registration lapses.
///
/// `host` is an optional hint naming the lookup service to query. Protocols
/// that discover their endpoint on their own are free to ignore it.
#[async_trait]
pub trait ExpiryClient: Send + Sync {
    async fn expire_time(
        &self,
        deadline: &Deadline,
        domain: &str,
        host: Option<&str>,
    ) -> Result<DateTime<Utc>>;
}

#[async_trait]
impl<T: ExpiryClient + ?Sized> ExpiryClient for Arc<T> {
    async fn expire_time(
        &self,
        deadline: &Deadline,
        domain: &str,
        host: Option<&str>,
    ) -> Result<DateTime<Utc>> {
        (**self).expire_time(deadline, domain, host).await
    }
}

/// Tries each client in order and returns the first success.
///
/// When every client fails, the error from the last one attempted is
/// returned. No client is retried.
pub struct MultiClient {
    clients: Vec<Box<dyn ExpiryClient>>,
}

impl MultiClient {
    pub fn new(clients: Vec<Box<dyn ExpiryClient>>) -> Self {
        Self { clients }
    }

    /// RDAP first, WHOIS as fallback.
    pub fn rdap_then_whois() -> Result<Self> {
        Ok(Self::new(vec![
            Box::new(RdapClient::new()?),
            Box::new(WhoisClient::new()),
        ]))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[async_trait]
impl ExpiryClient for MultiClient {
    async fn expire_time(
        &self,
        deadline: &Deadline,
        domain: &str,
        host: Option<&str>,
    ) -> Result<DateTime<Utc>> {
        let mut last_error = ExpiryError::NoClients;

        for (index, client) in self.clients.iter().enumerate() {
            match client.expire_time(deadline, domain, host).await {
                Ok(expiry) => return Ok(expiry),
                Err(e) => {
                    debug!(
                        domain = %domain,
                        client = index,
                        error = %e,
                        "Lookup client failed, trying next"
                    );
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}
