//! Outbound target checks for integration calls.
//!
//! Only `http` and `https` URLs are allowed. Unless private networks are
//! explicitly allowed, a target is rejected when its host is, or resolves
//! to, a loopback, private, link-local, unique-local, unspecified or
//! broadcast address.
//!
//! The up-front check gives a clear error before any I/O. [`GuardedResolver`]
//! applies the same rule to the addresses the client actually dials, so a
//! host that re-resolves to an internal address between the two lookups is
//! still refused.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use reqwest::Url;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};

use super::IntegrationError;

/// Parse `raw` and check it against the scheme and address rules.
pub async fn check_target(raw: &str, allow_private: bool) -> Result<Url, IntegrationError> {
    let url = Url::parse(raw).map_err(|e| IntegrationError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(IntegrationError::SchemeNotAllowed(url.scheme().to_string()));
    }
    let Some(host) = url.host_str() else {
        return Err(IntegrationError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    };
    if allow_private {
        return Ok(url);
    }

    // IPv6 literals come back bracketed.
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return if is_internal(ip) {
            Err(IntegrationError::BlockedAddress {
                host: host.to_string(),
                address: ip,
            })
        } else {
            Ok(url)
        };
    }

    let port = url.port_or_known_default().unwrap_or(80);
    let addresses = tokio::net::lookup_host((bare, port))
        .await
        .map_err(|e| IntegrationError::Request(format!("failed to resolve '{host}': {e}")))?;
    for address in addresses {
        if is_internal(address.ip()) {
            return Err(IntegrationError::BlockedAddress {
                host: host.to_string(),
                address: address.ip(),
            });
        }
    }
    Ok(url)
}

/// DNS resolver for the integration client that refuses internal addresses.
#[derive(Debug, Default, Clone, Copy)]
pub struct GuardedResolver;

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            let host = name.as_str().to_string();
            // The connector fills in the port.
            let addresses: Vec<SocketAddr> =
                tokio::net::lookup_host((host.as_str(), 0)).await?.collect();
            if let Some(blocked) = addresses.iter().find(|a| is_internal(a.ip())) {
                tracing::warn!(host = %host, address = %blocked.ip(), "refused connection to internal address");
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("'{host}' resolves to internal address {}", blocked.ip()),
                )
                .into());
            }
            let addrs: Addrs = Box::new(addresses.into_iter());
            Ok(addrs)
        })
    }
}

/// Whether `ip` points into a loopback, private or link-local range.
pub fn is_internal(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_internal_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_internal_v4(v4),
            None => is_internal_v6(v6),
        },
    }
}

fn is_internal_v4(ip: Ipv4Addr) -> bool {
    let o = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64/10 carrier-grade NAT
        || (o[0] == 100 && (64..=127).contains(&o[1]))
}

fn is_internal_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xffc0) == 0xfe80 // fe80::/10 link-local
        || (first & 0xfe00) == 0xfc00 // fc00::/7 unique local
}
