//! URL checks for anything the server surfaces or fetches on a user's behalf.
//!
//! [`assert_allowed_scheme`] is the cheap, offline check used when a URL is
//! only displayed. [`validate_for_replay`] is the full check run before an
//! outbound request: scheme, host denylist, literal private addresses, and the
//! addresses the hostname resolves to (DNS rebinding).

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use async_trait::async_trait;
use tracing::debug;
use url::{Host, Url};

use crate::error::{HarcurlError, Result};

const BLOCKED_HOSTS: &[&str] = &[
    "localhost",
    "metadata",
    "metadata.google.internal",
    "metadata.goog",
    "metadata.azure.com",
    "instance-data",
    "instance-data.ec2.internal",
];

/// Resolves hostnames to addresses. Abstracted so tests can simulate DNS.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// Resolver backed by the operating system via tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        Ok(tokio::net::lookup_host((host, port)).await?.collect())
    }
}

/// A URL that passed [`validate_for_replay`], with the addresses it resolved to.
///
/// `addrs` is empty when the host was a literal IP or DNS resolution failed.
#[derive(Debug, Clone)]
pub struct ReplayTarget {
    pub url: Url,
    pub addrs: Vec<SocketAddr>,
}

/// Parse a URL and require http or https. Never touches the network.
pub fn assert_allowed_scheme(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|err| HarcurlError::InvalidUrl(format!("{raw}: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(HarcurlError::SchemeNotAllowed(other.to_string())),
    }
}

pub async fn validate_for_replay(raw: &str) -> Result<ReplayTarget> {
    validate_for_replay_with(raw, &SystemResolver).await
}

pub async fn validate_for_replay_with(
    raw: &str,
    resolver: &dyn HostResolver,
) -> Result<ReplayTarget> {
    let url = assert_allowed_scheme(raw)?;

    let host = match url.host() {
        Some(host) => host.to_owned(),
        None => return Err(HarcurlError::InvalidUrl(format!("{raw}: missing host"))),
    };

    let domain = match host {
        Host::Ipv4(ip) => {
            check_ip(IpAddr::V4(ip))?;
            return Ok(ReplayTarget { url, addrs: Vec::new() });
        }
        Host::Ipv6(ip) => {
            check_ip(IpAddr::V6(ip))?;
            return Ok(ReplayTarget { url, addrs: Vec::new() });
        }
        Host::Domain(domain) => domain,
    };

    let normalized = domain.trim_end_matches('.').to_ascii_lowercase();
    if BLOCKED_HOSTS.contains(&normalized.as_str()) {
        return Err(HarcurlError::BlockedHost(normalized));
    }

    let port = url.port_or_known_default().unwrap_or(80);
    let addrs = match resolver.resolve(&normalized, port).await {
        Ok(addrs) => addrs,
        Err(err) => {
            // Leave the failure to the fetch, which reports it in context.
            debug!(host = %normalized, error = %err, "DNS lookup failed during validation");
            Vec::new()
        }
    };
    for addr in &addrs {
        check_ip(addr.ip())?;
    }

    Ok(ReplayTarget { url, addrs })
}

/// Fail with `BlockedIp` for loopback, private, link-local, CGNAT and similar ranges.
pub fn check_ip(ip: IpAddr) -> Result<()> {
    if is_blocked_ip(ip) {
        Err(HarcurlError::BlockedIp(ip.to_string()))
    } else {
        Ok(())
    }
}

pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_blocked_ipv4(v4),
            None => is_blocked_ipv6(v6),
        },
    }
}

fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    a == 0
        || a == 10
        || a == 127
        || (a == 169 && b == 254)
        || (a == 172 && (16..=31).contains(&b))
        || (a == 192 && b == 168)
        || (a == 100 && (64..=127).contains(&b))
}

fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticResolver(HashMap<&'static str, Vec<IpAddr>>);

    #[async_trait]
    impl HostResolver for StaticResolver {
        async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
            match self.0.get(host) {
                Some(ips) => Ok(ips.iter().map(|ip| SocketAddr::new(*ip, port)).collect()),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "no such host")),
            }
        }
    }

    fn resolver() -> StaticResolver {
        let mut map: HashMap<&'static str, Vec<IpAddr>> = HashMap::new();
        map.insert("api.example.com", vec!["93.184.216.34".parse().unwrap()]);
        map.insert("rebind.example.com", vec!["127.0.0.1".parse().unwrap()]);
        map.insert(
            "mixed.example.com",
            vec!["93.184.216.34".parse().unwrap(), "10.1.2.3".parse().unwrap()],
        );
        StaticResolver(map)
    }

    #[test]
    fn scheme_check_is_offline() {
        assert!(assert_allowed_scheme("https://api.example.com/x").is_ok());
        assert!(matches!(
            assert_allowed_scheme("ftp://host/x"),
            Err(HarcurlError::SchemeNotAllowed(_))
        ));
        assert!(matches!(
            assert_allowed_scheme("not a url"),
            Err(HarcurlError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn rejects_private_literals_and_localhost() {
        let r = resolver();
        for url in [
            "http://127.0.0.1/x",
            "http://10.0.0.1/x",
            "http://169.254.169.254/x",
            "http://172.20.1.1/x",
            "http://192.168.0.10/x",
            "http://100.64.0.1/x",
            "http://0.0.0.0/x",
            "http://[::1]/x",
            "http://[fd00::1]/x",
            "http://[fe80::1]/x",
            "http://[::ffff:127.0.0.1]/x",
        ] {
            let err = validate_for_replay_with(url, &r).await.unwrap_err();
            assert!(matches!(err, HarcurlError::BlockedIp(_)), "{url}: {err}");
        }

        let err = validate_for_replay_with("http://localhost/x", &r).await.unwrap_err();
        assert!(matches!(err, HarcurlError::BlockedHost(_)));
        let err = validate_for_replay_with("http://LOCALHOST./x", &r).await.unwrap_err();
        assert!(matches!(err, HarcurlError::BlockedHost(_)));
        let err = validate_for_replay_with("http://metadata.google.internal/x", &r)
            .await
            .unwrap_err();
        assert!(matches!(err, HarcurlError::BlockedHost(_)));
    }

    #[tokio::test]
    async fn rejects_disallowed_schemes() {
        let r = resolver();
        for url in ["ftp://host/x", "file:///etc/passwd", "gopher://host/"] {
            let err = validate_for_replay_with(url, &r).await.unwrap_err();
            assert!(matches!(err, HarcurlError::SchemeNotAllowed(_)), "{url}");
        }
    }

    #[tokio::test]
    async fn rejects_hosts_that_resolve_to_private_addresses() {
        let r = resolver();
        let err = validate_for_replay_with("https://rebind.example.com/x", &r)
            .await
            .unwrap_err();
        assert!(matches!(err, HarcurlError::BlockedIp(ip) if ip == "127.0.0.1"));

        let err = validate_for_replay_with("https://mixed.example.com/x", &r)
            .await
            .unwrap_err();
        assert!(matches!(err, HarcurlError::BlockedIp(_)));
    }

    #[tokio::test]
    async fn accepts_public_hosts_and_pins_their_addresses() {
        let target = validate_for_replay_with("https://api.example.com/v1?x=1", &resolver())
            .await
            .unwrap();
        assert_eq!(target.url.host_str(), Some("api.example.com"));
        assert_eq!(target.addrs, vec!["93.184.216.34:443".parse::<SocketAddr>().unwrap()]);

        let target = validate_for_replay_with("http://8.8.8.8/", &resolver()).await.unwrap();
        assert!(target.addrs.is_empty());
    }

    #[tokio::test]
    async fn dns_failure_does_not_fail_validation() {
        let target = validate_for_replay_with("https://unknown.example.org/", &resolver())
            .await
            .unwrap();
        assert!(target.addrs.is_empty());
    }

    #[test]
    fn range_boundaries() {
        assert!(!is_blocked_ip("172.32.0.1".parse().unwrap()));
        assert!(!is_blocked_ip("100.128.0.1".parse().unwrap()));
        assert!(!is_blocked_ip("169.253.1.1".parse().unwrap()));
        assert!(is_blocked_ip("172.31.255.255".parse().unwrap()));
        assert!(!is_blocked_ip("2606:4700::1111".parse().unwrap()));
    }
}
