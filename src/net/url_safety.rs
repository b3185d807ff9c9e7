//! SSRF-safe URL validation and normalization.
//!
//! Every URL reaching the fetcher goes through here first: scheme and
//! hostname checks, private-address rejection (literal and DNS-resolved),
//! then tracking-parameter stripping.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::Url;

/// Query parameters stripped during normalization.
const TRACKING_PARAMS: &[&str] = &[
    "_pos",
    "_sid",
    "_ss",
    "_ga",
    "_gl",
    "ref",
    "fbclid",
    "gclid",
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
];

const MAX_URL_LENGTH: usize = 2048;

#[derive(Debug, Error)]
pub enum UrlSafetyError {
    #[error("URL is empty")]
    Empty,
    #[error("URL is too long")]
    TooLong,
    #[error("invalid URL: {0}")]
    Invalid(#[from] url::ParseError),
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("only https URLs are allowed")]
    HttpsRequired,
    #[error("userinfo in URL is not allowed")]
    UserInfo,
    #[error("localhost/internal hostnames are not allowed")]
    LocalHostname,
    #[error("private IPs are not allowed")]
    PrivateIp,
    #[error("hostname resolves to a private IP")]
    ResolvesPrivate,
    #[error("URL has no hostname")]
    NoHost,
}

#[derive(Debug, Clone)]
pub struct UrlSafetyOptions {
    pub require_https: bool,
    /// Resolve the hostname and reject if any address is private.
    pub resolve_dns: bool,
}

impl Default for UrlSafetyOptions {
    fn default() -> Self {
        Self {
            require_https: false,
            resolve_dns: true,
        }
    }
}

pub fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.octets()[0] == 0
}

pub fn is_private_ipv6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    let segments = ip.segments();
    // Unique local fc00::/7
    if (segments[0] & 0xfe00) == 0xfc00 {
        return true;
    }
    // Link local fe80::/10
    if (segments[0] & 0xffc0) == 0xfe80 {
        return true;
    }
    // IPv4-mapped ::ffff:a.b.c.d
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_ipv4(v4);
    }
    false
}

fn is_private(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(ip) => is_private_ipv4(ip),
        IpAddr::V6(ip) => is_private_ipv6(ip),
    }
}

fn looks_local_hostname(hostname: &str) -> bool {
    let h = hostname.to_lowercase();
    h == "localhost"
        || h.ends_with(".localhost")
        || h.ends_with(".local")
        || h == "0"
        || h == "metadata"
        || h.ends_with(".internal")
}

/// Validate a URL against SSRF rules and return its normalized form with
/// fragment and tracking parameters removed.
pub async fn validate_and_normalize_url(
    input: &str,
    opts: &UrlSafetyOptions,
) -> Result<String, UrlSafetyError> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(UrlSafetyError::Empty);
    }
    if raw.len() > MAX_URL_LENGTH {
        return Err(UrlSafetyError::TooLong);
    }

    let mut url = Url::parse(raw)?;

    match url.scheme() {
        "https" => {}
        "http" if !opts.require_https => {}
        "http" => return Err(UrlSafetyError::HttpsRequired),
        other => return Err(UrlSafetyError::UnsupportedScheme(other.to_string())),
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(UrlSafetyError::UserInfo);
    }

    match url.host() {
        None => return Err(UrlSafetyError::NoHost),
        Some(url::Host::Ipv4(ip)) => {
            if is_private_ipv4(ip) {
                return Err(UrlSafetyError::PrivateIp);
            }
        }
        Some(url::Host::Ipv6(ip)) => {
            if is_private_ipv6(ip) {
                return Err(UrlSafetyError::PrivateIp);
            }
        }
        Some(url::Host::Domain(domain)) => {
            if looks_local_hostname(domain) {
                return Err(UrlSafetyError::LocalHostname);
            }
            if opts.resolve_dns {
                // Port is irrelevant for the lookup, only the addresses matter.
                let domain = domain.to_string();
                let resolved: Vec<std::net::SocketAddr> =
                    match tokio::net::lookup_host((domain.as_str(), 443)).await {
                        Ok(addrs) => addrs.collect(),
                        // An unresolvable name fails at fetch time instead.
                        Err(_) => Vec::new(),
                    };
                for sockaddr in resolved {
                    if is_private(sockaddr.ip()) {
                        return Err(UrlSafetyError::ResolvesPrivate);
                    }
                }
            }
        }
    }

    url.set_fragment(None);
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        drop(pairs);
    }

    Ok(url.to_string())
}

/// Strip the query string entirely, yielding the canonical product URL used
/// for discovery deduplication.
pub fn canonical_url(input: &str) -> String {
    match Url::parse(input) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => input.to_string(),
    }
}
