//! Domain registration expiry probing exported as Prometheus gauges.

pub mod collector;
pub mod config;
pub mod deadline;
pub mod error;
pub mod lookup;
pub mod rdap;
pub mod remote;
pub mod validation;
pub mod whois;

#[cfg(test)]
mod test_support;

pub use collector::{
    namespace_prefix, DomainCollector, ExpiryResult, MetricKind, Observation, NAMESPACE,
};
pub use config::{Config, ConfigError, Domain, RemoteStoreConfig};
pub use deadline::Deadline;
pub use error::{ExpiryError, Result};
pub use lookup::{ExpiryClient, MultiClient};
pub use rdap::RdapClient;
pub use remote::RemoteWriter;
pub use validation::normalize_domain;
pub use whois::WhoisClient;
