#![warn(missing_docs)]
//! SIP Transport Layer.
use std::{
    borrow::Cow,
    collections::HashMap,
    fmt,
    io::Write,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::SystemTime,
};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;

use crate::{
    endpoint::Endpoint,
    error::{Error, Result},
    headers::{self, CSeq, CallId, Contact, ContentLength, Header, Headers, SipHeaderParse, To, Via},
    message::{Request, Response, SipMethod, SipMsg, StatusCode, TransportProtocol},
    parser::Parser,
    transaction::{key::TsxKey, ServerTsx},
};

pub mod udp;

/// This trait represents a abstraction over a SIP transport
/// implementation.
#[async_trait::async_trait]
pub trait Transport: Sync + Send + 'static {
    /// Sends a buffer to the specified remote socket address.
    ///
    /// Returns the number of bytes sent or an I/O error.
    async fn send(&self, buf: &[u8], addr: &SocketAddr) -> Result<usize>;

    /// Returns the transport kind (e.g., UDP, TCP, TLS).
    fn tp_kind(&self) -> TransportProtocol;

    /// Returns the local socket address bound to this transport.
    fn addr(&self) -> SocketAddr;

    /// Checks if the provided address belongs to the same IP
    /// address family (IPv4 vs IPv6) as the local socket address.
    fn is_same_af(&self, addr: &SocketAddr) -> bool {
        let our_addr = self.addr();

        (addr.is_ipv4() && our_addr.is_ipv4()) || (addr.is_ipv6() && our_addr.is_ipv6())
    }

    /// Returns the local transport name.
    fn local_name(&self) -> Cow<'_, str>;

    /// Returns `true` if the transport is reliable (e.g., TCP or
    /// TLS).
    fn reliable(&self) -> bool;

    /// Returns `true` if the transport is secure (e.g., TLS).
    fn secure(&self) -> bool;

    /// Returns the key that uniquely identifies this transport
    /// connection.
    fn key(&self) -> TransportKey {
        TransportKey::new(self.addr(), self.tp_kind())
    }
}

/// This type represents a key used to identify a transport
/// connection.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TransportKey {
    /// The socket address of the transport.
    addr: SocketAddr,
    /// The transport kind (e.g., UDP, TCP, TLS).
    kind: TransportProtocol,
}

impl TransportKey {
    /// Creates a new `TransportKey`.
    pub fn new(addr: SocketAddr, kind: TransportProtocol) -> Self {
        TransportKey { addr, kind }
    }
}

/// Represents the raw binary content of a message or data block.
///
/// Commonly used for message bodies, network packets, or media
/// content.
#[derive(Debug, Clone)]
pub struct Payload(Bytes);

impl Payload {
    /// Creates a new `Payload`.
    #[inline]
    pub fn new(bytes: Bytes) -> Self {
        Payload(bytes)
    }

    /// Returns the raw byte buffer of this payload.
    pub fn buf(&self) -> &[u8] {
        &self.0
    }
}

/// This type represents a SIP packet.
#[derive(Debug, Clone)]
pub struct Packet {
    /// The packet payload.
    pub payload: Payload,
    /// The address of the sender.
    pub addr: SocketAddr,
    /// The time the packet was received.
    pub time: SystemTime,
}

/// Represents the address of an outbound message.
pub enum OutgoingAddr {
    /// A host and port that still has to be resolved.
    HostPort {
        /// The host and port of the address.
        host: crate::message::HostPort,
        /// The transport protocol used.
        protocol: TransportProtocol,
    },
    /// A resolved socket address with the transport to use.
    Addr {
        /// The socket address.
        addr: SocketAddr,
        /// The transport to use.
        transport: Arc<dyn Transport>,
    },
}

impl fmt::Debug for OutgoingAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutgoingAddr::HostPort { host, protocol } => f
                .debug_struct("HostPort")
                .field("host", host)
                .field("protocol", protocol)
                .finish(),
            OutgoingAddr::Addr { addr, transport } => f
                .debug_struct("Addr")
                .field("addr", addr)
                .field("transport", &transport.key())
                .finish(),
        }
    }
}

/// This trait is used to convert a type into a byte buffer.
pub trait ToBytes: Sized {
    /// Converts the type into a byte buffer.
    fn to_bytes(&self) -> Result<Bytes>;
}

fn write_msg_body<W: Write>(writer: &mut W, body: Option<&[u8]>) -> Result<()> {
    // The `Content-Length` header is always computed here, so
    // messages must be built without one.
    if let Some(body) = body {
        write!(writer, "{}: {}\r\n", ContentLength::NAME, body.len())?;
        write!(writer, "\r\n")?;
        writer.write_all(body)?;
    } else {
        write!(writer, "{}: 0\r\n", ContentLength::NAME)?;
        write!(writer, "\r\n")?;
    }

    Ok(())
}

/// This type represents an outgoing SIP response.
pub struct OutgoingResponse<'a> {
    /// The SIP response message.
    pub response: Response<'a>,
    /// The address to send the response to.
    pub addr: OutgoingAddr,
    /// The message raw buffer.
    pub buf: Option<Bytes>,
}

impl<'a> OutgoingResponse<'a> {
    /// Returns the message status code.
    pub fn status_code(&self) -> StatusCode {
        self.response.code()
    }

    /// Returns the message reason text.
    pub fn reason(&self) -> &str {
        self.response.reason()
    }

    /// Returns `true` if this is a provisional response.
    pub fn is_provisional(&self) -> bool {
        self.response.code().is_provisional()
    }

    /// Append headers to the message.
    pub fn append_headers(&mut self, other: &mut Headers<'a>) {
        self.response.headers.append(other);
    }

    /// Set the message body.
    pub fn set_body(&mut self, body: &'a [u8]) {
        self.response.body = Some(body);
    }

    /// Returns a mutable reference to the message headers.
    pub fn headers_mut(&mut self) -> &mut Headers<'a> {
        &mut self.response.headers
    }
}

impl ToBytes for OutgoingResponse<'_> {
    fn to_bytes(&self) -> Result<Bytes> {
        let estimated_message_size = if self.response.body.is_none() { 800 } else { 1500 };
        let buf = BytesMut::with_capacity(estimated_message_size);
        let mut buf_writer = buf.writer();

        write!(buf_writer, "{}", &self.response.status_line)?;
        write!(buf_writer, "{}", &self.response.headers)?;
        write_msg_body(&mut buf_writer, self.response.body)?;

        Ok(buf_writer.into_inner().freeze())
    }
}

/// This type represents an outbound SIP request.
pub struct OutgoingRequest<'a> {
    /// The SIP request message.
    pub msg: Request<'a>,
    /// The addr to send the request to.
    pub addr: SocketAddr,
    /// The message raw buffer.
    pub buf: Option<Bytes>,
    /// The transport to use for sending the request.
    pub transport: Arc<dyn Transport>,
}

impl ToBytes for OutgoingRequest<'_> {
    fn to_bytes(&self) -> Result<Bytes> {
        let estimated_message_size = if self.msg.body.is_none() { 800 } else { 1500 };
        let buf = BytesMut::with_capacity(estimated_message_size);
        let mut buf_writer = buf.writer();

        write!(buf_writer, "{}", &self.msg.req_line)?;
        write!(buf_writer, "{}", &self.msg.headers)?;
        write_msg_body(&mut buf_writer, self.msg.body)?;

        Ok(buf_writer.into_inner().freeze())
    }
}

/// The headers every message is required to carry, extracted once
/// at the transport layer.
pub(crate) struct RequestHeaders<'a> {
    /// The topmost Via header as found in the message.
    pub via: Via<'a>,
    /// The From header found in the message.
    pub from: headers::From<'a>,
    /// The CSeq header as found in the message.
    pub cseq: CSeq,
    /// The Call-ID header found in the message.
    pub call_id: CallId<'a>,
    /// The To header found in the message.
    pub to: To<'a>,
}

/// This type represents an received SIP request.
pub struct IncomingRequest<'req> {
    /// The SIP request message.
    pub(crate) request: Request<'req>,
    /// The transport used to receive the request.
    pub(crate) transport: Arc<dyn Transport>,
    /// The packet that contains the request.
    pub(crate) packet: Packet,
    /// The server transaction associated with this request, if
    /// any.
    pub(crate) transaction: Option<ServerTsx>,
    /// The request headers extracted from the request.
    pub(crate) request_headers: RequestHeaders<'req>,
}

impl<'req> IncomingRequest<'req> {
    /// Returns the `To` header of the request.
    pub fn to(&self) -> &To<'req> {
        &self.request_headers.to
    }

    /// Returns the `From` header of the request.
    pub fn from(&self) -> &headers::From<'req> {
        &self.request_headers.from
    }

    /// Returns the `Call-ID` header of the request.
    pub fn call_id(&self) -> &CallId<'req> {
        &self.request_headers.call_id
    }

    /// Returns the `CSeq` header of the request.
    pub fn cseq(&self) -> &CSeq {
        &self.request_headers.cseq
    }

    /// Returns the topmost `Via` header of the request.
    pub fn via(&self) -> &Via<'req> {
        &self.request_headers.via
    }

    /// Returns the transaction key for this request (if any).
    pub fn tsx_key(&self) -> Option<&TsxKey> {
        self.transaction.as_ref().map(|tsx| tsx.key())
    }

    /// Returns `true` if the message method matches the given
    /// `SipMethod`.
    #[inline(always)]
    pub fn is_method(&self, method: SipMethod) -> bool {
        self.request.method() == method
    }

    /// Returns the message method.
    pub fn method(&self) -> SipMethod {
        self.request.method()
    }

    /// Returns the message body.
    pub fn body(&self) -> Option<&'req [u8]> {
        self.request.body
    }

    /// Returns the `Contact` header of the request, if any.
    pub fn contact(&self) -> Option<&Contact<'req>> {
        crate::find_map_header!(self.request.headers, Contact)
    }

    /// Gets the source socket address of the packet.
    pub fn addr(&self) -> &SocketAddr {
        &self.packet.addr
    }

    /// Returns the transport the request arrived on.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    #[inline]
    pub(crate) fn set_tsx(&mut self, tsx: ServerTsx) {
        self.transaction = Some(tsx);
    }
}

/// Represents an received SIP response.
pub struct IncomingResponse<'r> {
    /// The SIP response message.
    pub(crate) response: Response<'r>,
    /// The transport used to receive the response.
    pub(crate) transport: Arc<dyn Transport>,
    /// The packet that contains the response.
    pub(crate) packet: Packet,
    /// The request headers extracted from the response.
    pub(crate) request_headers: RequestHeaders<'r>,
}

impl<'r> IncomingResponse<'r> {
    /// Returns the message status code.
    pub fn code(&self) -> StatusCode {
        self.response.code()
    }

    /// Returns the message reason text.
    pub fn reason(&self) -> &'r str {
        self.response.reason()
    }

    /// Returns the `CSeq` header of the response.
    pub fn cseq(&self) -> &CSeq {
        &self.request_headers.cseq
    }

    /// Returns the `Call-ID` header of the response.
    pub fn call_id(&self) -> &CallId<'r> {
        &self.request_headers.call_id
    }

    /// Returns the topmost `Via` header of the response.
    pub fn via(&self) -> &Via<'r> {
        &self.request_headers.via
    }

    /// Gets the source socket address of the packet.
    pub fn addr(&self) -> &SocketAddr {
        &self.packet.addr
    }

    /// Returns the packet that carried the response.
    pub fn packet(&self) -> &Packet {
        &self.packet
    }
}

pub(crate) enum TransportEvent {
    /// A packet was received from the transport layer.
    Packet {
        /// The transport the packet arrived on.
        transport: Arc<dyn Transport>,
        /// The packet itself.
        packet: Packet,
    },
}

pub(crate) type TransportTx = mpsc::Sender<TransportEvent>;
type TransportRx = mpsc::Receiver<TransportEvent>;

/// Transport Layer for SIP messages.
pub struct TransportLayer {
    /// A map of transports indexed by their unique keys.
    transports: Mutex<HashMap<TransportKey, Arc<dyn Transport>>>,
    /// The sender used to deliver events to the transport layer.
    transport_tx: TransportTx,
    /// A receiver for transport events.
    transport_rx: Mutex<Option<TransportRx>>,
}

impl Default for TransportLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportLayer {
    pub(crate) fn new() -> Self {
        let (transport_tx, transport_rx) = mpsc::channel(1_000);
        let transport_rx = Mutex::new(Some(transport_rx));

        Self {
            transport_tx,
            transport_rx,
            transports: Default::default(),
        }
    }

    pub(crate) fn add_transport(&self, transport: Arc<dyn Transport>) {
        self.transports
            .lock()
            .expect("Lock failed")
            .insert(transport.key(), transport);
    }

    pub(crate) fn sender(&self) -> &TransportTx {
        &self.transport_tx
    }

    /// Finds a suitable transport for the given destination
    /// address and transport type.
    pub fn find(&self, dst: SocketAddr, transport: TransportProtocol) -> Option<Arc<dyn Transport>> {
        tracing::debug!("Finding suitable transport={} for={}", transport, dst);

        let transports = self.transports.lock().expect("Lock failed");

        // Find by remote addr.
        let key = TransportKey::new(dst, transport);

        if let Some(transport) = transports.get(&key) {
            return Some(transport.clone());
        }

        // Find by transport protocol and address family.
        transports
            .values()
            .filter(|handle| handle.tp_kind() == transport && handle.is_same_af(&dst))
            .min_by(|a, b| Arc::strong_count(a).cmp(&Arc::strong_count(b)))
            .cloned()
    }

    pub(crate) async fn handle_events(&self, endpoint: &Endpoint) -> Result<()> {
        let mut rx = self
            .transport_rx
            .lock()
            .expect("Lock failed")
            .take()
            .expect("Transport event loop already running");

        // Loop to receive packets from the transports.
        while let Some(evt) = rx.recv().await {
            let TransportEvent::Packet { transport, packet } = evt;
            let endpoint = endpoint.clone();

            tokio::spawn(async move {
                if let Err(err) = Self::on_received_packet(transport, packet, endpoint).await {
                    tracing::warn!("Failed to process packet: {}", err);
                }
            });
        }

        Ok(())
    }

    async fn on_received_packet(
        transport: Arc<dyn Transport>,
        packet: Packet,
        endpoint: Endpoint,
    ) -> Result<()> {
        let payload = packet.payload.clone();
        let bytes = payload.buf();

        // Keep-Alive Request packet.
        if bytes == b"\r\n\r\n" {
            transport.send(b"\r\n", &packet.addr).await?;
            return Ok(());
        } else if bytes == b"\r\n" {
            // Keep-Alive Response packet.
            return Ok(());
        }

        // Parse the packet into a SIP message.
        let mut parser = Parser::new(bytes);
        let msg = match parser.parse_sip_msg() {
            Ok(parsed_msg) => parsed_msg,
            Err(err) => {
                tracing::warn!(
                    "Ignoring {} bytes packet from {} {} : {}\n{}-- end of packet.",
                    bytes.len(),
                    transport.tp_kind(),
                    packet.addr,
                    err,
                    String::from_utf8_lossy(bytes)
                );

                return Err(err);
            }
        };

        // Check for mandatory headers.
        let mut via = None;
        let mut cseq: Option<CSeq> = None;
        let mut from: Option<headers::From> = None;
        let mut call_id: Option<CallId> = None;
        let mut to: Option<To> = None;

        for header in msg.headers().iter() {
            match header {
                Header::Via(v) if via.is_none() => {
                    via = Some(v.clone());
                }
                Header::From(f) => {
                    from = Some(f.clone());
                }
                Header::To(t) => {
                    to = Some(t.clone());
                }
                Header::CallId(c) => {
                    call_id = Some(*c);
                }
                Header::CSeq(c) => {
                    cseq = Some(*c);
                }
                _ => (),
            }
        }

        let Some(mut via) = via else {
            return Err(Error::MissingRequiredHeader(Via::NAME));
        };

        let Some(from) = from else {
            return Err(Error::MissingRequiredHeader(headers::From::NAME));
        };

        let Some(to) = to else {
            return Err(Error::MissingRequiredHeader(To::NAME));
        };

        let Some(call_id) = call_id else {
            return Err(Error::MissingRequiredHeader(CallId::NAME));
        };

        let Some(cseq) = cseq else {
            return Err(Error::MissingRequiredHeader(CSeq::NAME));
        };

        if msg.is_request() {
            // 4. Server Behavior (https://datatracker.ietf.org/doc/html/rfc3581#section-4)
            // The server MUST insert a "received" parameter containing
            // the source IP address that the request came from, even if
            // it is identical to the value of the "sent-by" component.
            via.set_received(packet.addr.ip());

            // Requests asking for symmetric response routing also get
            // the source port recorded.
            if via.rport().is_present() {
                via.set_rport(packet.addr.port());
            }
        }

        let request_headers = RequestHeaders {
            via,
            cseq,
            call_id,
            from,
            to,
        };

        match msg {
            SipMsg::Request(request) => {
                let mut request = IncomingRequest {
                    request,
                    transport,
                    packet,
                    transaction: None,
                    request_headers,
                };
                endpoint.process_request(&mut request).await?;
            }
            SipMsg::Response(response) => {
                let mut response = IncomingResponse {
                    response,
                    transport,
                    packet,
                    request_headers,
                };
                endpoint.process_response(&mut response).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::udp::mock::MockUdpTransport;

    #[test]
    fn test_find_transport_by_exact_addr() {
        let transports = TransportLayer::default();
        let kind = TransportProtocol::Udp;

        transports.add_transport(Arc::new(MockUdpTransport::default()));

        let addr = "127.0.0.1:5060".parse().unwrap();
        assert!(transports.find(addr, kind).is_some());
    }

    #[test]
    fn test_find_transport_by_protocol_and_af() {
        let transports = TransportLayer::default();
        let kind = TransportProtocol::Udp;

        transports.add_transport(Arc::new(MockUdpTransport::default()));

        // No exact match for this destination, so the lookup falls
        // back to any UDP transport of the same address family.
        let addr = "192.0.2.33:8080".parse().unwrap();
        assert!(transports.find(addr, kind).is_some());
        assert!(transports.find("[2001:db8::1]:5060".parse().unwrap(), kind).is_none());
    }

    #[test]
    fn test_outgoing_response_to_bytes_appends_content_length() {
        let response = Response::new(StatusCode::Ok);
        let transport: Arc<dyn Transport> = Arc::new(MockUdpTransport::default());
        let msg = OutgoingResponse {
            response,
            addr: OutgoingAddr::Addr {
                addr: transport.addr(),
                transport,
            },
            buf: None,
        };

        let bytes = msg.to_bytes().unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();

        assert!(text.starts_with("SIP/2.0 200 OK\r\n"));
        assert!(text.ends_with("Content-Length: 0\r\n\r\n"));
    }
}
