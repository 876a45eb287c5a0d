//! Domain name normalization shared by the lookup protocols.

use crate::error::{ExpiryError, Result};

/// Normalize a configured domain name into the form the lookup protocols
/// expect.
///
/// This function:
/// - Trims surrounding whitespace and converts to lowercase
/// - Drops a single trailing root dot (`example.com.`)
/// - Requires at least one dot so a TLD can be derived
/// - Rejects embedded whitespace and control characters, which would corrupt a
///   line-oriented WHOIS query
///
/// It deliberately stops there: label syntax is left to the registries.
pub fn normalize_domain(domain: &str) -> Result<String> {
    let domain = domain.trim().to_lowercase();
    let domain = domain.strip_suffix('.').unwrap_or(&domain);

    if domain.is_empty() || !domain.contains('.') {
        return Err(ExpiryError::InvalidDomain(domain.to_string()));
    }

    if domain.starts_with('.') || domain.contains("..") {
        return Err(ExpiryError::InvalidDomain(domain.to_string()));
    }

    if domain
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '/')
    {
        return Err(ExpiryError::InvalidDomain(domain.to_string()));
    }

    Ok(domain.to_string())
}

/// Returns every dot-separated suffix of `domain`, longest first, excluding
/// the domain itself.
///
/// `a.example.co.uk` yields `example.co.uk`, `co.uk`, `uk`.
pub fn domain_suffixes(domain: &str) -> impl Iterator<Item = &str> {
    domain
        .match_indices('.')
        .map(move |(idx, _)| &domain[idx + 1..])
        .filter(|suffix| !suffix.is_empty())
}
