use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument, warn};

use super::parser::{extract_expiry, extract_referral, is_not_found};
use super::servers::{get_whois_server, IANA_WHOIS_SERVER};
use crate::deadline::Deadline;
use crate::error::{ExpiryError, Result};
use crate::lookup::ExpiryClient;
use crate::validation::normalize_domain;

const WHOIS_PORT: u16 = 43;
const MAX_RESPONSE_SIZE: usize = 1024 * 1024; // 1MB
const MAX_REFERRAL_DEPTH: u8 = 3;

/// Legacy port-43 lookup client.
///
/// With a host hint the hinted server is queried directly. Without one the
/// server comes from the built-in TLD table, falling back to IANA and
/// following `refer:` style referrals until an expiry date turns up.
#[derive(Debug, Clone)]
pub struct WhoisClient {
    port: u16,
    default_server: String,
}

impl Default for WhoisClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WhoisClient {
    pub fn new() -> Self {
        Self {
            port: WHOIS_PORT,
            default_server: IANA_WHOIS_SERVER.to_string(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Server queried when neither a hint nor the TLD table names one.
    pub fn with_default_server(mut self, server: impl Into<String>) -> Self {
        self.default_server = server.into();
        self
    }

    #[instrument(skip(self, deadline), fields(domain = %domain))]
    pub async fn lookup(
        &self,
        deadline: &Deadline,
        domain: &str,
        host: Option<&str>,
    ) -> Result<DateTime<Utc>> {
        let domain = normalize_domain(domain)?;

        if let Some(host) = host.map(str::trim).filter(|h| !h.is_empty()) {
            debug!(whois_server = %host, "Querying hinted WHOIS server");
            let raw = self.query_server(deadline, host, &domain).await?;
            return expiry_from_response(&domain, &raw);
        }

        let server = get_whois_server(&domain).unwrap_or(self.default_server.as_str());
        let mut visited = HashSet::new();
        self.lookup_with_referrals(deadline, &domain, server, 0, &mut visited)
            .await
    }

    fn lookup_with_referrals<'a>(
        &'a self,
        deadline: &'a Deadline,
        domain: &'a str,
        whois_server: &'a str,
        depth: u8,
        visited: &'a mut HashSet<String>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<DateTime<Utc>>> + Send + 'a>>
    {
        Box::pin(async move {
            visited.insert(whois_server.to_lowercase());
            debug!(
                whois_server = %whois_server,
                depth = depth,
                remaining = ?deadline.remaining(),
                "Querying WHOIS server"
            );

            let raw = self.query_server(deadline, whois_server, domain).await?;

            if let Some(expiry) = extract_expiry(&raw) {
                return Ok(expiry);
            }

            if let Some(referral) = extract_referral(&raw) {
                if visited.contains(&referral) {
                    warn!(server = %referral, "Circular WHOIS referral detected");
                } else if depth + 1 >= MAX_REFERRAL_DEPTH {
                    warn!(depth = depth, server = %referral, "Max referral depth exceeded");
                } else {
                    debug!(referral = %referral, "Following referral");
                    return self
                        .lookup_with_referrals(deadline, domain, &referral, depth + 1, visited)
                        .await;
                }
            }

            expiry_from_response(domain, &raw)
        })
    }

    async fn query_server(&self, deadline: &Deadline, server: &str, query: &str) -> Result<String> {
        let addr = server_addr(server, self.port)?;

        let mut stream = deadline
            .run(async {
                TcpStream::connect(&addr).await.map_err(|e| {
                    ExpiryError::WhoisError(format!("Failed to connect to {}: {}", server, e))
                })
            })
            .await?;

        // Dropping `stream` on any early return closes the socket.
        let response = deadline
            .run(async {
                stream
                    .write_all(format!("{}\r\n", query).as_bytes())
                    .await
                    .map_err(|e| ExpiryError::WhoisError(format!("Failed to send query: {}", e)))?;
                read_response(&mut stream).await
            })
            .await?;

        Ok(decode_response(response))
    }
}

#[async_trait]
impl ExpiryClient for WhoisClient {
    async fn expire_time(
        &self,
        deadline: &Deadline,
        domain: &str,
        host: Option<&str>,
    ) -> Result<DateTime<Utc>> {
        self.lookup(deadline, domain, host).await
    }
}

async fn read_response(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let mut response = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(response);
        }
        response.extend_from_slice(&buf[..n]);
        if response.len() > MAX_RESPONSE_SIZE {
            return Err(ExpiryError::WhoisError("Response too large".to_string()));
        }
    }
}

/// `host:port` for a server name that may already carry a port or be an IP
/// literal. A port in `server` wins over `default_port`.
fn server_addr(server: &str, default_port: u16) -> Result<String> {
    if let Ok(addr) = server.parse::<SocketAddr>() {
        return Ok(addr.to_string());
    }

    let unbracketed = server
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(server);
    if let Ok(ip) = unbracketed.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port).to_string());
    }

    match server.split_once(':') {
        None => Ok(format!("{}:{}", server, default_port)),
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(server.to_string())
        }
        Some(_) => Err(ExpiryError::WhoisError(format!(
            "Invalid WHOIS server address: {}",
            server
        ))),
    }
}

// UTF-8 when valid, Latin-1 otherwise.
fn decode_response(response: Vec<u8>) -> String {
    match String::from_utf8(response) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&c| c as char).collect(),
    }
}

fn expiry_from_response(domain: &str, raw: &str) -> Result<DateTime<Utc>> {
    if let Some(expiry) = extract_expiry(raw) {
        return Ok(expiry);
    }
    if is_not_found(raw) {
        return Err(ExpiryError::DomainNotFound(domain.to_string()));
    }
    Err(ExpiryError::WhoisNoExpiry(domain.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Answers the n-th accepted connection with `replies[n]`. The handle
    /// resolves to the queries received, in order.
    async fn whois_server(
        replies: Vec<&'static str>,
    ) -> (u16, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let mut queries = Vec::new();
            for reply in replies {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 512];
                let n = socket.read(&mut buf).await.unwrap();
                queries.push(String::from_utf8_lossy(&buf[..n]).to_string());
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            queries
        });

        (port, handle)
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_hinted_host_is_queried() {
        let (port, handle) =
            whois_server(vec!["Domain Name: EXAMPLE.COM\r\nRegistry Expiry Date: 2030-08-13T04:00:00Z\r\n"])
                .await;
        let client = WhoisClient::new().with_port(port);

        let expiry = client
            .expire_time(&deadline(), "Example.com", Some("127.0.0.1"))
            .await
            .unwrap();

        assert_eq!(expiry, Utc.with_ymd_and_hms(2030, 8, 13, 4, 0, 0).unwrap());
        assert_eq!(handle.await.unwrap(), vec!["example.com\r\n".to_string()]);
    }

    #[tokio::test]
    async fn test_follows_referral_from_default_server() {
        let (port, handle) = whois_server(vec![
            "% IANA WHOIS server\nrefer:        127.0.0.1\n",
            "Domain Name: EXAMPLE.INVALID\nExpiry Date: 2031-01-02\n",
        ])
        .await;
        let client = WhoisClient::new()
            .with_port(port)
            .with_default_server("localhost");

        let expiry = client
            .expire_time(&deadline(), "example.invalid", None)
            .await
            .unwrap();

        assert_eq!(expiry, Utc.with_ymd_and_hms(2031, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(handle.await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_not_found_response() {
        let (port, _handle) = whois_server(vec!["No match for \"BAD.INVALID\".\r\n"]).await;
        let client = WhoisClient::new().with_port(port);

        let err = client
            .expire_time(&deadline(), "bad.invalid", Some("127.0.0.1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ExpiryError::DomainNotFound(d) if d == "bad.invalid"));
    }

    #[tokio::test]
    async fn test_unparseable_response() {
        let (port, _handle) = whois_server(vec!["Domain: example.de\nStatus: connect\n"]).await;
        let client = WhoisClient::new().with_port(port);

        let err = client
            .expire_time(&deadline(), "example.de", Some("127.0.0.1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ExpiryError::WhoisNoExpiry(_)));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = WhoisClient::new().with_port(port);
        let err = client
            .expire_time(&deadline(), "example.com", Some("127.0.0.1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ExpiryError::WhoisError(_)));
    }

    #[tokio::test]
    async fn test_silent_server_hits_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let client = WhoisClient::new().with_port(port);
        let started = std::time::Instant::now();
        let err = client
            .expire_time(
                &Deadline::after(Duration::from_millis(100)),
                "example.com",
                Some("127.0.0.1"),
            )
            .await
            .unwrap_err();

        assert!(err.is_deadline_exceeded());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_hint_with_explicit_port() {
        let (port, handle) =
            whois_server(vec!["Domain Name: EXAMPLE.NET\r\nRegistry Expiry Date: 2029-04-05T00:00:00Z\r\n"])
                .await;
        let client = WhoisClient::new();

        let hint = format!("127.0.0.1:{}", port);
        let expiry = client
            .expire_time(&deadline(), "example.net", Some(hint.as_str()))
            .await
            .unwrap();

        assert_eq!(expiry, Utc.with_ymd_and_hms(2029, 4, 5, 0, 0, 0).unwrap());
        assert_eq!(handle.await.unwrap(), vec!["example.net\r\n".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_hint_rejected() {
        let client = WhoisClient::new();
        let err = client
            .expire_time(&deadline(), "example.net", Some("whois.example:notaport"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExpiryError::WhoisError(msg) if msg.contains("Invalid WHOIS server")));
    }

    #[test]
    fn test_server_addr() {
        assert_eq!(server_addr("whois.nic.uk", 43).unwrap(), "whois.nic.uk:43");
        assert_eq!(server_addr("whois.nic.uk:4343", 43).unwrap(), "whois.nic.uk:4343");
        assert_eq!(server_addr("127.0.0.1", 43).unwrap(), "127.0.0.1:43");
        assert_eq!(server_addr("127.0.0.1:4343", 43).unwrap(), "127.0.0.1:4343");
        assert_eq!(server_addr("2001:db8::1", 43).unwrap(), "[2001:db8::1]:43");
        assert_eq!(server_addr("[2001:db8::1]", 43).unwrap(), "[2001:db8::1]:43");
        assert_eq!(server_addr("[2001:db8::1]:4343", 43).unwrap(), "[2001:db8::1]:4343");
        assert!(server_addr("whois.example:x", 43).is_err());
        assert!(server_addr(":43", 43).is_err());
    }

    #[test]
    fn test_decode_latin1_fallback() {
        let decoded = decode_response(vec![b'E', b'x', 0xE9]);
        assert_eq!(decoded, "Ex\u{e9}");
    }
}
