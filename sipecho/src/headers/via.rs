use core::fmt;
use std::net::IpAddr;

use sipecho_util::util::is_valid_port;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::macros::parse_param;
use crate::message::{Host, HostPort, Params, TransportProtocol};
use crate::parser::Parser;

pub(crate) const BRANCH_PARAM: &str = "branch";
pub(crate) const RPORT_PARAM: &str = "rport";
pub(crate) const RECEIVED_PARAM: &str = "received";
pub(crate) const MADDR_PARAM: &str = "maddr";

/// The `rport` parameter of a `Via` header.
///
/// A client requests response-port routing by sending the
/// parameter without a value. The server fills in the source
/// port it saw.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum Rport {
    /// The parameter is not present.
    #[default]
    Absent,
    /// The parameter is present without a value.
    Requested,
    /// The parameter carries a port.
    Value(u16),
}

impl Rport {
    /// Returns `true` if the parameter is present, with or
    /// without a value.
    pub const fn is_present(&self) -> bool {
        !matches!(self, Rport::Absent)
    }

    /// Returns the port, if one was set.
    pub const fn value(&self) -> Option<u16> {
        match self {
            Rport::Value(port) => Some(*port),
            _ => None,
        }
    }
}

/// The `Via` header.
///
/// Records the transport and the address a request went
/// through, so that responses can travel the same path back.
///
/// # Examples
///
/// ```
/// # use sipecho::headers::Via;
/// let via = Via::new_udp("192.0.2.15:5060".parse().unwrap(), "z9hG4bK87asdks7");
///
/// assert_eq!(
///     via.to_string(),
///     "Via: SIP/2.0/UDP 192.0.2.15:5060;rport;branch=z9hG4bK87asdks7"
/// );
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Via<'a> {
    transport: TransportProtocol,
    sent_by: HostPort,
    rport: Rport,
    received: Option<IpAddr>,
    branch: Option<&'a str>,
    maddr: Option<Host>,
    params: Option<Params<'a>>,
}

impl<'a> Via<'a> {
    /// Creates an UDP `Via` with the given sent-by and branch.
    ///
    /// The `rport` parameter is requested, so that responses
    /// come back to the port the request left from.
    pub fn new_udp(sent_by: HostPort, branch: &'a str) -> Self {
        Via {
            transport: TransportProtocol::Udp,
            sent_by,
            rport: Rport::Requested,
            received: None,
            branch: Some(branch),
            maddr: None,
            params: None,
        }
    }

    /// Returns the transport protocol.
    pub const fn transport(&self) -> TransportProtocol {
        self.transport
    }

    /// Returns the sent-by host and port.
    pub const fn sent_by(&self) -> &HostPort {
        &self.sent_by
    }

    /// Returns the `rport` parameter.
    pub const fn rport(&self) -> Rport {
        self.rport
    }

    /// Returns the `received` parameter.
    pub const fn received(&self) -> Option<IpAddr> {
        self.received
    }

    /// Sets the `received` parameter.
    pub const fn set_received(&mut self, addr: IpAddr) {
        self.received = Some(addr);
    }

    /// Sets the `rport` parameter to the given port.
    pub const fn set_rport(&mut self, port: u16) {
        self.rport = Rport::Value(port);
    }

    /// Returns the branch parameter.
    pub const fn branch(&self) -> Option<&'a str> {
        self.branch
    }

    /// Returns the `maddr` parameter.
    pub const fn maddr(&self) -> Option<&Host> {
        self.maddr.as_ref()
    }
}

impl<'a> SipHeaderParse<'a> for Via<'a> {
    const NAME: &'static str = "Via";
    const SHORT_NAME: &'static str = "v";

    /*
     * Via               =  ( "Via" / "v" ) HCOLON via-parm *(COMMA via-parm)
     * via-parm          =  sent-protocol LWS sent-by *( SEMI via-params )
     * via-params        =  via-ttl / via-maddr
     *                      / via-received / via-branch
     *                      / via-extension
     * via-maddr         =  "maddr" EQUAL host
     * via-received      =  "received" EQUAL (IPv4address / IPv6address)
     * via-branch        =  "branch" EQUAL token
     * via-extension     =  generic-param
     * sent-protocol     =  protocol-name SLASH protocol-version
     *                      SLASH transport
     * protocol-name     =  "SIP" / token
     * protocol-version  =  token
     * transport         =  "UDP" / "TCP" / "TLS" / "SCTP"
     *                      / other-transport
     * sent-by           =  host [ COLON port ]
     */
    fn parse(parser: &mut Parser<'a>) -> Result<Self> {
        parser.parse_sip_version()?;
        parser.must_read(b'/')?;
        let transport = parser.read_transport();
        parser.skip_ws();
        let sent_by = parser.parse_host_port()?;

        let mut branch = None;
        let mut received_value = None;
        let mut maddr_value = None;
        let mut params = parse_param!(
            parser,
            Parser::parse_via_param,
            BRANCH_PARAM = branch,
            RECEIVED_PARAM = received_value,
            MADDR_PARAM = maddr_value
        );

        // The bare form of rport carries no value, so it cannot go
        // through the named-parameter match above.
        let rport = match params.as_mut().and_then(|params| params.take(RPORT_PARAM)) {
            Some(Some(rport)) => match rport.parse::<u16>() {
                Ok(port) if is_valid_port(port) => Rport::Value(port),
                _ => return parser.parse_error("Via contains an invalid rport"),
            },
            Some(None) => Rport::Requested,
            None => Rport::Absent,
        };
        let params = params.filter(|params| !params.is_empty());
        let received = received_value.and_then(|addr: &str| addr.parse().ok());
        let maddr = maddr_value.map(Host::from);

        Ok(Via {
            transport,
            sent_by,
            rport,
            received,
            branch,
            maddr,
            params,
        })
    }
}

impl fmt::Display for Via<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: SIP/2.0/{} {}", Via::NAME, self.transport, self.sent_by)?;

        match self.rport {
            Rport::Absent => (),
            Rport::Requested => write!(f, ";rport")?,
            Rport::Value(port) => write!(f, ";rport={}", port)?,
        }
        if let Some(received) = self.received {
            write!(f, ";received={}", received)?;
        }
        if let Some(maddr) = &self.maddr {
            write!(f, ";maddr={}", maddr)?;
        }
        if let Some(branch) = self.branch {
            write!(f, ";branch={}", branch)?;
        }
        if let Some(params) = &self.params {
            write!(f, ";{}", params)?;
        }

        Ok(())
    }
}
