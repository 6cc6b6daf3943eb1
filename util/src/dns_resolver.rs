//! DNS resolve with the `DnsResolver` type.

use std::io;
use std::net::IpAddr;

use hickory_resolver::TokioAsyncResolver;

/// A DNS resolver backed by [hickory-dns](https://github.com/hickory-dns/hickory-dns).
///
/// Used to turn the host part of a SIP URI into an address before
/// a request leaves the endpoint.
pub struct DnsResolver {
    dns_resolver: TokioAsyncResolver,
}

impl DnsResolver {
    /// Resolve `host` to its first address.
    pub async fn resolve(&self, host: &str) -> Result<IpAddr, io::Error> {
        let lookup = self
            .dns_resolver
            .lookup_ip(host)
            .await
            .map_err(|err| io::Error::other(format!("Failed to lookup DNS: {}", err)))?;

        lookup
            .iter()
            .next()
            .ok_or_else(|| io::Error::other(format!("No address found for '{}'", host)))
    }
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self {
            dns_resolver: hickory_resolver::AsyncResolver::tokio_from_system_conf()
                .expect("Failed to get DNS resolver"),
        }
    }
}
