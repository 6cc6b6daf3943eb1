use std::{
    borrow::Cow,
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
    sync::Arc,
};

use itertools::Itertools;

use crate::error::SipParserError;
use crate::message::{Params, TransportProtocol};

/// The scheme of a SIP URI.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum Scheme {
    /// The `sip` scheme.
    #[default]
    Sip,
    /// The `sips` scheme.
    Sips,
}

impl Scheme {
    /// Returns the scheme as written on the wire.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The userinfo part of a URI.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct UriUser<'a> {
    /// The user name.
    pub user: &'a str,
    /// The optional password.
    pub pass: Option<&'a str>,
}

impl fmt::Display for UriUser<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.user)?;
        if let Some(pass) = self.pass {
            write!(f, ":{}", pass)?;
        }
        Ok(())
    }
}

/// The host part of a URI or of a `Via` sent-by.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum Host {
    /// A domain name.
    DomainName(Arc<str>),
    /// An IPv4 or IPv6 address.
    IpAddr(IpAddr),
}

impl Default for Host {
    fn default() -> Self {
        Host::IpAddr(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

impl Host {
    /// Returns the host as text.
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            Host::DomainName(domain) => Cow::Borrowed(domain.as_ref()),
            Host::IpAddr(addr) => Cow::Owned(addr.to_string()),
        }
    }

    /// Returns the address if the host is an IP address.
    pub const fn ip_addr(&self) -> Option<IpAddr> {
        match self {
            Host::DomainName(_) => None,
            Host::IpAddr(addr) => Some(*addr),
        }
    }

    /// Returns `true` if the host is a domain name.
    pub const fn is_domain(&self) -> bool {
        matches!(self, Host::DomainName(_))
    }
}

impl From<&str> for Host {
    fn from(host: &str) -> Self {
        match host.parse::<IpAddr>() {
            Ok(addr) => Host::IpAddr(addr),
            Err(_) => Host::DomainName(Arc::from(host)),
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::DomainName(domain) => f.write_str(domain),
            Host::IpAddr(addr) => write!(f, "{}", addr),
        }
    }
}

/// A host with an optional port.
///
/// IPv6 addresses are written with brackets, as SIP requires.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct HostPort {
    /// The host.
    pub host: Host,
    /// The port, if present.
    pub port: Option<u16>,
}

impl HostPort {
    /// Creates a new `HostPort`.
    pub const fn new(host: Host, port: Option<u16>) -> Self {
        HostPort { host, port }
    }

    /// Returns the address if the host is an IP address.
    pub const fn ip_addr(&self) -> Option<IpAddr> {
        self.host.ip_addr()
    }

    /// Returns `true` if the host is a domain name.
    pub const fn is_domain(&self) -> bool {
        self.host.is_domain()
    }
}

impl Default for HostPort {
    fn default() -> Self {
        HostPort {
            host: Host::default(),
            port: Some(5060),
        }
    }
}

impl From<SocketAddr> for HostPort {
    fn from(addr: SocketAddr) -> Self {
        HostPort {
            host: Host::IpAddr(addr.ip()),
            port: Some(addr.port()),
        }
    }
}

impl FromStr for HostPort {
    type Err = SipParserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix('[') {
            let (addr, rest) = rest
                .split_once(']')
                .ok_or_else(|| SipParserError::from(format!("Invalid host '{}'", s)))?;
            let addr: IpAddr = addr
                .parse()
                .map_err(|_| SipParserError::from(format!("Invalid IPv6 host '{}'", s)))?;
            let port = match rest.strip_prefix(':') {
                Some(port) => Some(parse_port(port)?),
                None if rest.is_empty() => None,
                None => return Err(SipParserError::from(format!("Invalid host '{}'", s))),
            };

            return Ok(HostPort { host: Host::IpAddr(addr), port });
        }

        match s.rsplit_once(':') {
            Some((host, port)) => Ok(HostPort {
                host: Host::from(host),
                port: Some(parse_port(port)?),
            }),
            None => Ok(HostPort {
                host: Host::from(s),
                port: None,
            }),
        }
    }
}

fn parse_port(port: &str) -> Result<u16, SipParserError> {
    port.parse()
        .map_err(|_| SipParserError::from(format!("Invalid port '{}'", port)))
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::IpAddr(IpAddr::V6(addr)) => write!(f, "[{}]", addr)?,
            host => write!(f, "{}", host)?,
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

/// The URI of a SIP message.
///
/// # Examples
///
/// ```
/// # use sipecho::message::Uri;
/// let uri = Uri::builder()
///     .user("alice")
///     .host_port("atlanta.example.com".parse().unwrap())
///     .get();
///
/// assert_eq!(uri.to_string(), "sip:alice@atlanta.example.com");
/// ```
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Uri<'a> {
    /// The URI scheme.
    pub scheme: Scheme,
    /// The userinfo part.
    pub user: Option<UriUser<'a>>,
    /// The host and optional port.
    pub host_port: HostPort,
    /// The `;transport=` parameter.
    pub transport_param: Option<TransportProtocol>,
    /// The `;lr` parameter.
    pub lr_param: bool,
    /// The `;maddr=` parameter.
    pub maddr_param: Option<Host>,
    /// Any other URI parameters.
    pub params: Option<Params<'a>>,
    /// The `?hdr=value` headers of the URI.
    pub hdr_params: Option<Params<'a>>,
}

impl<'a> Uri<'a> {
    /// Returns a builder for a `Uri`.
    pub fn builder() -> UriBuilder<'a> {
        UriBuilder::default()
    }

    /// Returns a copy of this URI with all parameters and headers
    /// removed.
    pub fn without_params(&self) -> Uri<'a> {
        Uri {
            params: None,
            hdr_params: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for Uri<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}", self.host_port)?;

        if let Some(transport) = self.transport_param {
            write!(f, ";transport={}", transport)?;
        }
        if let Some(maddr) = &self.maddr_param {
            write!(f, ";maddr={}", maddr)?;
        }
        if self.lr_param {
            f.write_str(";lr")?;
        }
        if let Some(params) = &self.params {
            write!(f, ";{}", params)?;
        }
        if let Some(hdr_params) = &self.hdr_params {
            write!(f, "?{}", hdr_params.iter().format("&"))?;
        }

        Ok(())
    }
}

/// Builder for [`Uri`].
#[derive(Default)]
pub struct UriBuilder<'a> {
    uri: Uri<'a>,
}

impl<'a> UriBuilder<'a> {
    /// Creates a builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scheme.
    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.uri.scheme = scheme;
        self
    }

    /// Sets the user part.
    pub fn user(mut self, user: &'a str) -> Self {
        self.uri.user = Some(UriUser { user, pass: None });
        self
    }

    /// Sets the host and port.
    pub fn host_port(mut self, host_port: HostPort) -> Self {
        self.uri.host_port = host_port;
        self
    }

    /// Sets the `;transport=` parameter.
    pub fn transport_param(mut self, transport: TransportProtocol) -> Self {
        self.uri.transport_param = Some(transport);
        self
    }

    /// Returns the built URI.
    pub fn get(self) -> Uri<'a> {
        self.uri
    }
}

/// A URI with an optional display name, written inside angle
/// brackets.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NameAddr<'a> {
    /// The display name.
    pub display: Option<&'a str>,
    /// The wrapped URI.
    pub uri: Uri<'a>,
}

impl fmt::Display for NameAddr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(display) = self.display {
            write!(f, "{} ", display)?;
        }
        write!(f, "<{}>", self.uri)
    }
}

/// Either a plain URI or a [`NameAddr`].
///
/// Headers such as `From`, `To` and `Contact` accept both forms.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SipUri<'a> {
    /// An `addr-spec` URI.
    Uri(Uri<'a>),
    /// A `name-addr` with optional display name.
    NameAddr(NameAddr<'a>),
}

impl<'a> SipUri<'a> {
    /// Returns the inner URI of either form.
    pub const fn uri(&self) -> &Uri<'a> {
        match self {
            SipUri::Uri(uri) => uri,
            SipUri::NameAddr(name_addr) => &name_addr.uri,
        }
    }

    /// Returns the userinfo part.
    pub fn user(&self) -> Option<&UriUser<'a>> {
        self.uri().user.as_ref()
    }

    /// Returns the host and port.
    pub const fn host_port(&self) -> &HostPort {
        &self.uri().host_port
    }

    /// Returns the URI scheme.
    pub const fn scheme(&self) -> Scheme {
        self.uri().scheme
    }

    /// Returns the `;transport=` parameter.
    pub const fn transport_param(&self) -> Option<TransportProtocol> {
        self.uri().transport_param
    }
}

impl<'a> From<Uri<'a>> for SipUri<'a> {
    fn from(uri: Uri<'a>) -> Self {
        SipUri::Uri(uri)
    }
}

impl<'a> From<NameAddr<'a>> for SipUri<'a> {
    fn from(name_addr: NameAddr<'a>) -> Self {
        SipUri::NameAddr(name_addr)
    }
}

impl fmt::Display for SipUri<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SipUri::Uri(uri) => write!(f, "{}", uri),
            SipUri::NameAddr(name_addr) => write!(f, "{}", name_addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_display() {
        let uri = Uri::builder()
            .user("bob")
            .host_port(HostPort {
                host: Host::IpAddr("192.0.2.4".parse().unwrap()),
                port: Some(5060),
            })
            .get();

        assert_eq!(uri.to_string(), "sip:bob@192.0.2.4:5060");
    }

    #[test]
    fn test_name_addr_display() {
        let uri = Uri::builder()
            .user("bob")
            .host_port("biloxi.example.com".parse().unwrap())
            .get();
        let name_addr = NameAddr {
            display: Some("Bob"),
            uri,
        };

        assert_eq!(name_addr.to_string(), "Bob <sip:bob@biloxi.example.com>");
    }

    #[test]
    fn test_host_port_from_str() {
        let host_port: HostPort = "atlanta.example.com:5070".parse().unwrap();
        assert_eq!(host_port.port, Some(5070));
        assert!(host_port.is_domain());

        let host_port: HostPort = "[2001:db8::9]:6000".parse().unwrap();
        assert_eq!(host_port.to_string(), "[2001:db8::9]:6000");

        assert!("host:banana".parse::<HostPort>().is_err());
    }
}
