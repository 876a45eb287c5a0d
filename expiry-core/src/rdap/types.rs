use chrono::{DateTime, Utc};
use serde::Deserialize;

/// The subset of an RDAP domain object needed to find its expiry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RdapDomain {
    #[serde(default)]
    pub ldh_name: Option<String>,

    #[serde(default)]
    pub events: Vec<RdapEvent>,
}

impl RdapDomain {
    /// Date of the first `expiration` event that carries a parseable date.
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.events
            .iter()
            .filter(|e| e.event_action.eq_ignore_ascii_case("expiration"))
            .find_map(RdapEvent::parsed_date)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RdapEvent {
    pub event_action: String,
    #[serde(default)]
    pub event_date: Option<String>,
}

impl RdapEvent {
    pub fn parsed_date(&self) -> Option<DateTime<Utc>> {
        self.event_date.as_ref()?.parse().ok()
    }
}

/// IANA bootstrap registry document (RFC 9224).
#[derive(Debug, Deserialize)]
pub(crate) struct BootstrapRegistry {
    pub services: Vec<Vec<serde_json::Value>>,
}
