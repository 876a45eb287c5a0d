use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExpiryError {
    #[error("WHOIS lookup failed: {0}")]
    WhoisError(String),

    #[error("WHOIS connection failed: {0}")]
    WhoisConnectionFailed(#[from] std::io::Error),

    #[error("WHOIS response for {0} has no recognizable expiry date")]
    WhoisNoExpiry(String),

    #[error("RDAP lookup failed: {0}")]
    RdapError(String),

    #[error("RDAP bootstrap failed: {0}")]
    RdapBootstrapError(String),

    #[error("RDAP record for {0} has no expiration event")]
    RdapNoExpiry(String),

    #[error("Domain not found: {0}")]
    DomainNotFound(String),

    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("no lookup clients configured")]
    NoClients,

    #[error("metrics registry error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("remote write rejected with status {status}: {body}")]
    RemoteWrite { status: u16, body: String },

    #[error("remote write payload compression failed: {0}")]
    CompressionError(#[from] snap::Error),

    #[error("{0}")]
    Other(String),
}

impl ExpiryError {
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, ExpiryError::DeadlineExceeded)
    }
}

pub type Result<T> = std::result::Result<T, ExpiryError>;
