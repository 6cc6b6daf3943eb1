use std::fmt;

/// The transport protocol of a SIP hop, as written in `Via` headers
/// and `;transport=` URI parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportProtocol {
    /// `UDP` transport.
    #[default]
    Udp,
    /// `TCP` transport.
    Tcp,
    /// `TLS` transport.
    Tls,
    /// `WS` transport.
    Ws,
    /// Unknown transport.
    Unknown,
}

impl TransportProtocol {
    /// Returns the default port for this protocol.
    pub const fn default_port(&self) -> u16 {
        match self {
            TransportProtocol::Udp | TransportProtocol::Tcp => 5060,
            TransportProtocol::Tls => 5061,
            TransportProtocol::Ws => 80,
            TransportProtocol::Unknown => 5060,
        }
    }

    /// Returns the protocol name as it appears on the wire.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Udp => "UDP",
            TransportProtocol::Tcp => "TCP",
            TransportProtocol::Tls => "TLS",
            TransportProtocol::Ws => "WS",
            TransportProtocol::Unknown => "UNKNOWN",
        }
    }
}

impl From<&str> for TransportProtocol {
    fn from(value: &str) -> Self {
        value.as_bytes().into()
    }
}

impl From<&[u8]> for TransportProtocol {
    fn from(value: &[u8]) -> Self {
        if value.eq_ignore_ascii_case(b"UDP") {
            TransportProtocol::Udp
        } else if value.eq_ignore_ascii_case(b"TCP") {
            TransportProtocol::Tcp
        } else if value.eq_ignore_ascii_case(b"TLS") {
            TransportProtocol::Tls
        } else if value.eq_ignore_ascii_case(b"WS") {
            TransportProtocol::Ws
        } else {
            TransportProtocol::Unknown
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
