#![deny(missing_docs)]
//! SIP Endpoint.

#[allow(missing_docs)]
pub mod builder;

pub use builder::Builder;

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use std::{io, sync::Arc};

use sipecho_util::DnsResolver;
use tokio::net::ToSocketAddrs;

use crate::headers::{Header, Headers, Via};
use crate::message::{Host, HostPort, Response, StatusCode, TransportProtocol};
use crate::transaction::{TransactionLayer, TsxUas, TsxUasInv};
use crate::transport::udp::UdpTransport;
use crate::transport::{
    IncomingRequest, IncomingResponse, OutgoingAddr, OutgoingResponse, ToBytes, Transport, TransportLayer,
};
use crate::{Result, SipService};

struct Inner {
    /// The transport layer for the endpoint.
    transport: TransportLayer,
    /// The transaction layer for the endpoint.
    transaction: Option<TransactionLayer>,
    /// The name of the endpoint.
    name: String,
    /// The capability header list.
    capabilities: Headers<'static>,
    /// The resolver for DNS lookups.
    resolver: DnsResolver,
    /// The list of services registered.
    services: Box<[Box<dyn SipService>]>,
}

/// The SIP endpoint.
///
/// An endpoint is a logical entity that can send and receive SIP
/// messages, manage transactions, and interact with various SIP
/// services. The endpoint is responsible for handling incoming
/// requests and responses, as well as sending outgoing messages.
#[derive(Clone)]
pub struct Endpoint(Arc<Inner>);

impl Endpoint {
    /// Returns a builder to create an `Endpoint`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sipecho::*;
    /// let endpoint = Endpoint::builder()
    ///     .with_name("My Endpoint")
    ///     .build();
    /// ```
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Runs the endpoint until `timeout` elapses.
    pub async fn run_with_timeout(self, timeout: Duration) -> Result<()> {
        let _ = tokio::time::timeout(timeout, self.receive_message()).await;

        Ok(())
    }

    /// Runs the endpoint by processing messages from the transport
    /// layer.
    ///
    /// This method spawns a new Tokio task that will run
    /// indefinitely, processing incoming SIP messages.
    pub async fn run(self) -> Result<()> {
        tokio::spawn(Box::pin(self.receive_message()))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("Task join error: {}", e)))??;

        Ok(())
    }

    async fn receive_message(self) -> Result<()> {
        self.0.transport.handle_events(&self).await
    }

    /// Starts a UDP transport bound to `addr`.
    ///
    /// The transport is registered on the transport layer and its
    /// receive loop runs until the endpoint is dropped.
    pub async fn start_udp<A: ToSocketAddrs>(&self, addr: A) -> Result<()> {
        let udp = UdpTransport::bind(addr).await?;

        tracing::debug!(
            "SIP {} transport started, listening on {}",
            TransportProtocol::Udp,
            udp.local_name()
        );

        let udp = Arc::new(udp);
        self.0.transport.add_transport(udp.clone());

        tokio::spawn(Box::pin(UdpTransport::recv_from(udp, self.0.transport.sender().clone())));

        Ok(())
    }

    /// Get the endpoint name.
    pub fn get_name(&self) -> &String {
        &self.0.name
    }

    /// Returns the capability headers advertised by the endpoint.
    pub fn capabilities(&self) -> &Headers<'static> {
        &self.0.capabilities
    }

    /// Creates a new User Agent Server (UAS) transaction.
    ///
    /// This method initializes a [`TsxUas`] instance, which
    /// represents the server transaction for handling incoming SIP
    /// requests that are not `INVITE` requests.
    pub fn new_uas_tsx(&self, request: &mut IncomingRequest) -> TsxUas {
        TsxUas::new(self, request)
    }

    /// Creates a new User Agent Server (UAS) INVITE transaction.
    ///
    /// This method initializes a [`TsxUasInv`] instance, which
    /// represents the server transaction for handling an incoming
    /// `INVITE` request.
    pub fn new_uas_inv_tsx(&self, request: &mut IncomingRequest<'_>) -> TsxUasInv {
        TsxUasInv::new(self, request)
    }

    /// Responds statelessly to a request.
    ///
    /// This method creates a response from the incoming request and
    /// sends it statelessly, meaning that no `UAS` transaction is
    /// created and retransmissions of the request are not absorbed.
    pub async fn respond(&self, request: &IncomingRequest<'_>, code: StatusCode) -> Result<()> {
        // No `UAS` transaction must be created for this request.
        assert!(request.transaction.is_none(), "Request already has a transaction");

        let msg = self.new_response(request, code);

        self.send_response(&msg).await
    }

    /// Creates a new SIP response based on an incoming request.
    ///
    /// This method generates a response message with the specified
    /// status code and the default reason phrase for it. It also
    /// copies the necessary headers from the request, including
    /// `Via`, `Record-Route`, `Call-ID`, `From`, `To` and `CSeq`.
    pub fn new_response<'a>(&self, req: &IncomingRequest<'a>, code: StatusCode) -> OutgoingResponse<'a> {
        // Copy the necessary headers from the request.
        let mut headers = Headers::with_capacity(7);
        let msg_headers = &req.request.headers;

        // `Via` headers. The topmost one carries the `received`
        // and `rport` parameters stamped at reception.
        let topmost_via = req.request_headers.via.clone();
        let via = msg_headers.iter().filter(|h| matches!(h, Header::Via(_))).skip(1);
        headers.push(Header::Via(topmost_via));
        headers.extend(via.cloned());

        // `Record-Route` headers are echoed unchanged so that a
        // dialog built on this response learns its route set.
        let rr = msg_headers
            .iter()
            .filter(|h| matches!(h, Header::Other(o) if o.name.eq_ignore_ascii_case("Record-Route")));
        headers.extend(rr.cloned());

        // `Call-ID` header.
        headers.push(Header::CallId(req.request_headers.call_id));

        // `From` header.
        headers.push(Header::From(req.request_headers.from.clone()));

        // `To` header.
        let mut to = req.request_headers.to.clone();
        // 8.2.6.2 Headers and Tags
        // The UAS MUST add a tag to the To header field in
        // the response (with the exception of the 100 (Trying)
        // response, in which a tag MAY be present).
        if to.tag.is_none() && code.as_u16() > 100 {
            if let Some(branch) = req.request_headers.via.branch() {
                to.set_tag(branch);
            }
        }
        headers.push(Header::To(to));

        // `CSeq` header.
        headers.push(Header::CSeq(req.request_headers.cseq));

        let addr = self.get_outbound_addr(&req.request_headers.via, &req.transport);

        OutgoingResponse {
            response: Response::new_with_headers(code, headers),
            addr,
            buf: None,
        }
    }

    /// Sends a SIP response to the address carried in it.
    ///
    /// This method encodes the response message, unless a prebuilt
    /// buffer is attached to it, and sends it using the appropriate
    /// transport.
    pub async fn send_response(&self, response: &OutgoingResponse<'_>) -> Result<()> {
        tracing::debug!(
            "=> Response {} {}",
            response.status_code().as_u16(),
            response.reason()
        );

        let encoded_buf = match response.buf {
            Some(ref buf) => buf.clone(),
            None => response.to_bytes()?,
        };

        match response.addr {
            OutgoingAddr::HostPort { ref host, protocol } => {
                let addr = self.resolve_host_port(host).await?;

                // Find a transport able to reach the resolved
                // address.
                let transport = self.0.transport.find(addr, protocol).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("Transport not found for {} {}", addr, protocol),
                    )
                })?;

                transport.send(&encoded_buf, &addr).await?;
            }
            OutgoingAddr::Addr { addr, ref transport } => {
                transport.send(&encoded_buf, &addr).await?;
            }
        }

        Ok(())
    }

    pub(crate) async fn resolve_host_port(&self, host_port: &HostPort) -> Result<SocketAddr> {
        let ip = self.resolve_host_to_ip(&host_port.host).await?;
        let port = host_port.port.unwrap_or(5060);

        Ok(SocketAddr::new(ip, port))
    }

    async fn resolve_host_to_ip(&self, host: &Host) -> Result<IpAddr> {
        match host {
            Host::DomainName(domain) => Ok(self.0.resolver.resolve(domain).await?),
            Host::IpAddr(ip) => Ok(*ip),
        }
    }

    // https://datatracker.ietf.org/doc/html/rfc3261#section-18.2.2
    // https://datatracker.ietf.org/doc/html/rfc3581#section-4
    fn get_outbound_addr(&self, via: &Via<'_>, transport: &Arc<dyn Transport>) -> OutgoingAddr {
        if transport.reliable() {
            // The response goes back over the same connection.
            return OutgoingAddr::Addr {
                addr: transport.addr(),
                transport: transport.clone(),
            };
        }

        if let Some(maddr) = via.maddr() {
            let port = via.sent_by().port.unwrap_or(5060);

            return OutgoingAddr::HostPort {
                host: HostPort {
                    host: maddr.clone(),
                    port: Some(port),
                },
                protocol: via.transport(),
            };
        }

        let port = match via.rport().value() {
            Some(rport) => rport,
            None => via.sent_by().port.unwrap_or(5060),
        };

        match via.received() {
            Some(ip) => OutgoingAddr::Addr {
                addr: SocketAddr::new(ip, port),
                transport: transport.clone(),
            },
            // Without a received parameter the response is routed
            // to the sent-by host.
            None => OutgoingAddr::HostPort {
                host: HostPort {
                    host: via.sent_by().host.clone(),
                    port: Some(port),
                },
                protocol: via.transport(),
            },
        }
    }

    pub(crate) async fn process_request(&self, request: &mut IncomingRequest<'_>) -> Result<()> {
        tracing::debug!("<= Request {} from /{}", request.method(), request.addr());

        let handled_by_transaction_layer = match self.0.transaction {
            Some(ref tsx_layer) => tsx_layer.handle_request(request).await?,
            None => false,
        };

        if handled_by_transaction_layer {
            return Ok(());
        }

        // The request did not match any transaction, so it goes to
        // the services.
        for service in self.0.services.iter() {
            if service.on_incoming_request(self, request).await? {
                return Ok(());
            }
        }

        tracing::debug!(
            "Request ({}, cseq={}) from /{} was unhandled by any service",
            request.method(),
            request.cseq().cseq,
            request.addr()
        );

        Ok(())
    }

    pub(crate) async fn process_response(&self, response: &mut IncomingResponse<'_>) -> Result<()> {
        tracing::debug!(
            "<= Response {} {} from /{}",
            response.code().as_u16(),
            response.reason(),
            response.addr()
        );

        let handled_by_transaction_layer = match self.0.transaction {
            Some(ref tsx_layer) => tsx_layer.handle_response(response).await?,
            None => false,
        };

        if handled_by_transaction_layer {
            return Ok(());
        }

        for service in self.0.services.iter() {
            if service.on_incoming_response(self, response).await? {
                return Ok(());
            }
        }

        tracing::debug!(
            "Response ({} {}) from /{} was unhandled by any service",
            response.code().as_u16(),
            response.reason(),
            response.addr()
        );

        Ok(())
    }

    pub(crate) fn get_tsx_layer(&self) -> &TransactionLayer {
        self.0.transaction.as_ref().expect("Transaction layer not set")
    }

    pub(crate) fn transport(&self) -> &TransportLayer {
        &self.0.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::headers::CSeq;
    use crate::message::SipMethod;
    use crate::transaction::mock;
    use crate::transport::udp::mock::MockUdpTransport;

    #[test]
    fn test_new_response_adds_to_tag() {
        let endpoint = mock::default_endpoint();
        let mut request = mock::request(SipMethod::Options);
        request.request_headers.via.set_received("192.0.2.1".parse().unwrap());

        let response = endpoint.new_response(&request, StatusCode::Ok);

        let to = response
            .response
            .headers
            .iter()
            .find_map(|h| match h {
                Header::To(to) => Some(to),
                _ => None,
            })
            .unwrap();

        assert_eq!(to.tag, Some("z9hG4bK3060200"));

        let cseq = response
            .response
            .headers
            .iter()
            .find_map(|h| match h {
                Header::CSeq(cseq) => Some(*cseq),
                _ => None,
            })
            .unwrap();

        assert_eq!(cseq, CSeq::new(1, SipMethod::Options));
    }

    #[test]
    fn test_new_response_100_has_no_to_tag() {
        let endpoint = mock::default_endpoint();
        let mut request = mock::request(SipMethod::Invite);
        request.request_headers.via.set_received("192.0.2.1".parse().unwrap());

        let response = endpoint.new_response(&request, StatusCode::Trying);

        let to = response
            .response
            .headers
            .iter()
            .find_map(|h| match h {
                Header::To(to) => Some(to),
                _ => None,
            })
            .unwrap();

        assert_eq!(to.tag, None);
    }

    #[test]
    fn test_response_goes_to_rport_when_set() {
        let endpoint = mock::default_endpoint();
        let mut request = mock::request(SipMethod::Options);
        request.request_headers.via.set_received("192.0.2.9".parse().unwrap());
        request.request_headers.via.set_rport(5099);

        let response = endpoint.new_response(&request, StatusCode::Ok);

        assert_matches!(
            response.addr,
            OutgoingAddr::Addr { addr, .. } if addr == "192.0.2.9:5099".parse().unwrap()
        );
    }

    #[test]
    fn test_response_falls_back_to_sent_by() {
        let endpoint = mock::default_endpoint();
        let request = mock::request(SipMethod::Options);

        let response = endpoint.new_response(&request, StatusCode::Ok);

        assert_matches!(
            response.addr,
            OutgoingAddr::HostPort {
                host: HostPort { port: Some(5060), .. },
                protocol: TransportProtocol::Udp,
            }
        );
    }

    #[tokio::test]
    async fn test_stateless_respond_sends_response() {
        let endpoint = mock::default_endpoint();
        let transport = Arc::new(MockUdpTransport::default());
        let mut request = mock::request_with(SipMethod::Options, transport.clone());
        request.request_headers.via.set_received("127.0.0.1".parse().unwrap());

        endpoint.respond(&request, StatusCode::NotImplemented).await.unwrap();

        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_crlf_keep_alive_is_answered() {
        let endpoint = Endpoint::builder().build();
        endpoint.start_udp("127.0.0.1:0").await.unwrap();
        let addr = endpoint
            .transport()
            .find("127.0.0.1:5060".parse().unwrap(), TransportProtocol::Udp)
            .unwrap()
            .addr();
        tokio::spawn(endpoint.clone().run());

        let client = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"\r\n\r\n", addr).await.unwrap();

        let mut buf = [0u8; 8];
        let (len, from) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .expect("No keep-alive reply")
            .unwrap();

        assert_eq!(&buf[..len], b"\r\n");
        assert_eq!(from, addr);
    }
}
