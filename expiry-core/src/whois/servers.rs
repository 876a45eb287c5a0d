use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::validation::domain_suffixes;

/// Server of last resort; answers every TLD with a `refer:` line.
pub const IANA_WHOIS_SERVER: &str = "whois.iana.org";

const KNOWN_SERVERS: &[(&str, &str)] = &[
    // Generic TLDs
    ("com", "whois.verisign-grs.com"),
    ("net", "whois.verisign-grs.com"),
    ("org", "whois.pir.org"),
    ("info", "whois.afilias.net"),
    ("biz", "whois.biz"),
    ("app", "whois.nic.google"),
    ("dev", "whois.nic.google"),
    ("page", "whois.nic.google"),
    ("blog", "whois.nic.blog"),
    ("cloud", "whois.nic.cloud"),
    ("xyz", "whois.nic.xyz"),
    ("online", "whois.nic.online"),
    ("site", "whois.nic.site"),
    ("tech", "whois.nic.tech"),
    ("store", "whois.nic.store"),
    ("shop", "whois.nic.shop"),
    // Country code TLDs
    ("ai", "whois.nic.ai"),
    ("ar", "whois.nic.ar"),
    ("at", "whois.nic.at"),
    ("au", "whois.auda.org.au"),
    ("be", "whois.dns.be"),
    ("br", "whois.registro.br"),
    ("ca", "whois.cira.ca"),
    ("cc", "ccwhois.verisign-grs.com"),
    ("ch", "whois.nic.ch"),
    ("cn", "whois.cnnic.cn"),
    ("co", "whois.nic.co"),
    ("cz", "whois.nic.cz"),
    ("de", "whois.denic.de"),
    ("dk", "whois.dk-hostmaster.dk"),
    ("es", "whois.nic.es"),
    ("eu", "whois.eu"),
    ("fi", "whois.fi"),
    ("fm", "whois.nic.fm"),
    ("fr", "whois.nic.fr"),
    ("gg", "whois.gg"),
    ("ie", "whois.iedr.ie"),
    ("in", "whois.registry.in"),
    ("io", "whois.nic.io"),
    ("it", "whois.nic.it"),
    ("jp", "whois.jprs.jp"),
    ("kr", "whois.kr"),
    ("ly", "whois.nic.ly"),
    ("me", "whois.nic.me"),
    ("mx", "whois.mx"),
    ("nl", "whois.domain-registry.nl"),
    ("no", "whois.norid.no"),
    ("nz", "whois.srs.net.nz"),
    ("pl", "whois.dns.pl"),
    ("pt", "whois.dns.pt"),
    ("ru", "whois.tcinet.ru"),
    ("se", "whois.iis.se"),
    ("sh", "whois.nic.sh"),
    ("tv", "whois.nic.tv"),
    ("uk", "whois.nic.uk"),
    ("co.uk", "whois.nic.uk"),
    ("org.uk", "whois.nic.uk"),
    ("com.au", "whois.auda.org.au"),
    ("com.br", "whois.registro.br"),
];

static WHOIS_SERVERS: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| KNOWN_SERVERS.iter().copied().collect());

/// Picks the WHOIS server for a normalized domain, matching the longest known
/// suffix first so `example.co.uk` resolves through `co.uk`.
pub fn get_whois_server(domain: &str) -> Option<&'static str> {
    domain_suffixes(domain).find_map(|suffix| WHOIS_SERVERS.get(suffix).copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tlds() {
        assert_eq!(get_whois_server("example.com"), Some("whois.verisign-grs.com"));
        assert_eq!(get_whois_server("example.org"), Some("whois.pir.org"));
        assert_eq!(get_whois_server("example.co.uk"), Some("whois.nic.uk"));
        assert_eq!(get_whois_server("a.b.example.de"), Some("whois.denic.de"));
    }

    #[test]
    fn test_unknown_tld() {
        assert_eq!(get_whois_server("bad.invalid"), None);
    }
}
