mod client;
mod parser;
mod servers;

pub use client::WhoisClient;
pub use parser::{extract_expiry, parse_date};
pub use servers::{get_whois_server, IANA_WHOIS_SERVER};
