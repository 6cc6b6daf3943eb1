#![deny(missing_docs)]
//! SIP Transaction Layer.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use std::{io, mem};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::message::StatusCode;
use crate::transport::{IncomingRequest, IncomingResponse, OutgoingResponse, Packet, ToBytes, Transport};

pub(crate) mod client;
pub(crate) mod key;
pub(crate) mod server;
pub(crate) mod server_invite;

pub use client::TsxUac;
pub use key::TsxKey;
pub use server::TsxUas;
pub use server_invite::TsxUasInv;

/// Estimated round-trip time (RTT) for message exchanges.
///
/// This value is used as the baseline when computing
/// retransmission intervals.
pub(crate) const T1: Duration = Duration::from_millis(500);

/// Maximum retransmission interval for non-INVITE requests and
/// INVITE responses.
///
/// Retransmissions back off exponentially, but will not exceed
/// this value.
pub(crate) const T2: Duration = Duration::from_secs(4);

/// Maximum duration that a message may remain in the network
/// before being discarded.
pub(crate) const T4: Duration = Duration::from_secs(5);

type LastMsg = tokio::sync::RwLock<Option<Bytes>>;
type LastStatusCode = RwLock<Option<StatusCode>>;

struct Inner {
    /// The endpoint associated with the transaction.
    endpoint: Endpoint,
    /// The key used to identify the transaction.
    key: TsxKey,
    /// The transport the transaction sends on.
    transport: Arc<dyn Transport>,
    /// The address of the remote endpoint.
    addr: SocketAddr,
    /// The current state of the transaction.
    state: Mutex<State>,
    /// The last status code sent in the transaction.
    status_code: LastStatusCode,
    /// The retransmission count for the transaction.
    retransmit_count: AtomicUsize,
    /// The last message sent in the transaction.
    last_msg: LastMsg,
}

/// Represents a SIP Transaction.
///
/// A SIP Transaction consists of a set of messages exchanged
/// between a client (`UAC`) and a server (`UAS`) to complete a
/// certain action, such as establishing or terminating a call.
///
/// This type is the shared core of the server transaction
/// types; client transactions are driven by the caller and only
/// register a delivery channel in the [`TransactionLayer`].
#[derive(Clone)]
pub struct Transaction(Arc<Inner>);

impl Transaction {
    fn builder() -> Builder {
        Default::default()
    }

    pub(crate) fn key(&self) -> &TsxKey {
        &self.0.key
    }

    fn schedule_termination(&self, time: Duration) {
        let tsx = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(time).await;
            tsx.on_terminated();
        });
    }

    #[inline]
    /// Checks if the transport is reliable.
    pub fn reliable(&self) -> bool {
        self.0.transport.reliable()
    }

    #[inline]
    /// Retrieves the current state of the Transaction.
    pub fn get_state(&self) -> State {
        *self.0.state.lock().expect("Lock failed")
    }

    #[inline]
    /// Gets the count of retransmissions.
    pub fn retrans_count(&self) -> u32 {
        self.0.retransmit_count.load(Ordering::SeqCst) as u32
    }

    #[inline]
    pub(crate) fn add_retrans_count(&self) -> u32 {
        self.0.retransmit_count.fetch_add(1, Ordering::SeqCst) as u32 + 1
    }

    #[inline]
    /// Retrieves the last status code sent.
    pub fn last_status_code(&self) -> Option<StatusCode> {
        *self.0.status_code.read().expect("Lock failed")
    }

    fn on_terminated(&self) {
        self.set_state(State::Terminated);
        self.0.endpoint.get_tsx_layer().remove_server_tsx(&self.0.key);
    }

    fn set_state(&self, state: State) {
        let old = {
            let mut guard = self.0.state.lock().expect("Lock failed");
            mem::replace(&mut *guard, state)
        };
        tracing::trace!("State changed [{old:?} -> {state:?}] ({:p})", self.0);
    }

    #[inline]
    fn set_last_status_code(&self, code: StatusCode) {
        let mut guard = self.0.status_code.write().expect("Lock failed");
        *guard = Some(code);
    }

    pub(crate) async fn set_last_msg(&self, msg: Bytes) {
        let mut guard = self.0.last_msg.write().await;
        *guard = Some(msg);
    }

    async fn retransmit(&self) -> Result<u32> {
        let retransmitted = {
            let lock = self.0.last_msg.read().await;
            if let Some(msg) = lock.as_ref() {
                self.0.transport.send(msg, &self.0.addr).await?;
                true
            } else {
                false
            }
        };

        if retransmitted {
            Ok(self.add_retrans_count())
        } else {
            Err(crate::error::Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "No message to retransmit",
            )))
        }
    }

    async fn tsx_send_response(&self, msg: &mut OutgoingResponse<'_>) -> Result<()> {
        let code = msg.status_code();
        tracing::debug!("=> Response {} {}", code.as_u16(), msg.reason());
        let buf = match msg.buf.take() {
            Some(buf) => buf,
            None => msg.to_bytes()?,
        };

        self.0.transport.send(&buf, &self.0.addr).await?;
        self.set_last_status_code(code);
        self.set_last_msg(buf).await;

        Ok(())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        tracing::trace!("Dropping transaction {:?} ({:p})", self.key, self);
    }
}

/// Builder for creating a new SIP `Transaction`.
#[derive(Default)]
struct Builder {
    endpoint: Option<Endpoint>,
    key: Option<TsxKey>,
    transport: Option<Arc<dyn Transport>>,
    addr: Option<SocketAddr>,
    state: Option<Mutex<State>>,
}

impl Builder {
    /// Sets the endpoint associated with the transaction.
    fn endpoint(&mut self, endpoint: Endpoint) -> &mut Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Sets the key used to identify the transaction.
    fn key(&mut self, key: TsxKey) -> &mut Self {
        self.key = Some(key);
        self
    }

    /// Sets the transport associated with the transaction.
    fn transport(&mut self, transport: Arc<dyn Transport>) -> &mut Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the address associated with the transaction.
    fn addr(&mut self, addr: SocketAddr) -> &mut Self {
        self.addr = Some(addr);
        self
    }

    /// Sets the transaction state.
    fn state(&mut self, state: State) -> &mut Self {
        self.state = Some(Mutex::new(state));
        self
    }

    /// Finalize the builder into a `Transaction`.
    fn build(self) -> Transaction {
        let inner = Inner {
            endpoint: self.endpoint.expect("Endpoint is required"),
            key: self.key.expect("Key is required"),
            transport: self.transport.expect("Transport is required"),
            addr: self.addr.expect("Address is required"),
            state: self.state.expect("State is required"),
            status_code: Default::default(),
            last_msg: Default::default(),
            retransmit_count: Default::default(),
        };

        Transaction(Arc::new(inner))
    }
}

/// Defines the possible states of a SIP Transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Initial state
    #[default]
    Initial,
    /// Trying state
    Trying,
    /// Proceeding state
    Proceeding,
    /// Completed state
    Completed,
    /// Accepted state (RFC 6026). An INVITE server transaction
    /// that sent a 2xx lingers here to absorb retransmissions of
    /// the INVITE while the TU retransmits the response.
    Accepted,
    /// Confirmed state
    Confirmed,
    /// Terminated state
    Terminated,
}

/// A Server Transaction, either Invite or NonInvite.
#[derive(Clone)]
pub enum ServerTsx {
    /// A NonInvite Server Transaction.
    NonInvite(TsxUas),
    /// An Invite Server Transaction.
    Invite(TsxUasInv),
}

impl ServerTsx {
    /// Retrieves the last status code sent by the transaction.
    pub fn last_status_code(&self) -> Option<StatusCode> {
        match self {
            ServerTsx::NonInvite(uas) => uas.last_status_code(),
            ServerTsx::Invite(uas_inv) => uas_inv.last_status_code(),
        }
    }

    pub(crate) fn key(&self) -> &TsxKey {
        match self {
            ServerTsx::NonInvite(uas) => uas.key(),
            ServerTsx::Invite(uas_inv) => uas_inv.key(),
        }
    }

    pub(crate) async fn recv_msg(&self, request: &IncomingRequest<'_>) -> Result<()> {
        match self {
            ServerTsx::NonInvite(uas) => uas.recv_msg(request).await,
            ServerTsx::Invite(uas_inv) => uas_inv.recv_msg(request).await,
        }
    }
}

/// Represents the transaction layer of the SIP protocol.
///
/// This type holds all server transactions created by the TU
/// (Transaction User) and the delivery channels of the pending
/// client transactions.
#[derive(Default)]
pub struct TransactionLayer {
    server_transactions: Mutex<HashMap<TsxKey, ServerTsx>>,
    client_transactions: Mutex<HashMap<TsxKey, mpsc::Sender<Packet>>>,
}

impl TransactionLayer {
    /// Remove a server transaction from the collection.
    #[inline]
    pub fn remove_server_tsx(&self, key: &TsxKey) -> Option<ServerTsx> {
        let mut map = self.server_transactions.lock().expect("Lock failed");
        map.remove(key)
    }

    #[inline]
    pub(crate) fn new_server_tsx(&self, tsx: TsxUas) {
        let key = tsx.key().clone();
        let mut map = self.server_transactions.lock().expect("Lock failed");

        map.insert(key, ServerTsx::NonInvite(tsx));
    }

    #[inline]
    pub(crate) fn new_server_inv_tsx(&self, tsx: TsxUasInv) {
        let key = tsx.key().clone();
        let mut map = self.server_transactions.lock().expect("Lock failed");

        map.insert(key, ServerTsx::Invite(tsx));
    }

    #[inline]
    pub(crate) fn add_client_tsx(&self, key: TsxKey, sender: mpsc::Sender<Packet>) {
        let mut map = self.client_transactions.lock().expect("Lock failed");

        map.insert(key, sender);
    }

    #[inline]
    pub(crate) fn remove_client_tsx(&self, key: &TsxKey) -> Option<mpsc::Sender<Packet>> {
        let mut map = self.client_transactions.lock().expect("Lock failed");
        map.remove(key)
    }

    fn find_server_tsx(&self, key: &TsxKey) -> Option<ServerTsx> {
        self.server_transactions.lock().expect("Lock failed").get(key).cloned()
    }

    fn find_client_tsx(&self, key: &TsxKey) -> Option<mpsc::Sender<Packet>> {
        self.client_transactions.lock().expect("Lock failed").get(key).cloned()
    }

    /// Hands a retransmitted request to its server transaction.
    ///
    /// Returns `false` if no transaction matches, in which case
    /// the request must be presented to the TU.
    pub(crate) async fn handle_request(&self, request: &IncomingRequest<'_>) -> Result<bool> {
        let server_tsx = {
            let key = TsxKey::create_server(request);

            match self.find_server_tsx(&key) {
                Some(tsx) => tsx,
                None => return Ok(false),
            }
        };

        server_tsx.recv_msg(request).await?;

        Ok(true)
    }

    /// Delivers a response to the client transaction that sent
    /// the matching request.
    ///
    /// Returns `false` if no transaction matches, in which case
    /// the response must be presented to the TU.
    pub(crate) async fn handle_response(&self, response: &IncomingResponse<'_>) -> Result<bool> {
        let Some(branch) = response.via().branch() else {
            return Ok(false);
        };
        let key = TsxKey::create_client(response.cseq().method, branch);

        let Some(sender) = self.find_client_tsx(&key) else {
            return Ok(false);
        };

        if sender.send(response.packet().clone()).await.is_err() {
            // The transaction completed while the response was
            // in flight.
            self.remove_client_tsx(&key);
            return Ok(false);
        }

        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    use std::time::SystemTime;

    use crate::headers::{CSeq, CallId, Headers, SipHeaderParse, To, Via};
    use crate::message::{Request, RequestLine, Response, SipMethod, SipUri};
    use crate::parser::Parser;
    use crate::transport::udp::mock::MockUdpTransport;
    use crate::transport::{OutgoingAddr, Payload, RequestHeaders};

    pub fn default_endpoint() -> Endpoint {
        crate::endpoint::Builder::new()
            .with_transaction_layer(TransactionLayer::default())
            .build()
    }

    pub fn response(code: StatusCode) -> OutgoingResponse<'static> {
        let via = Via::from_bytes(b"SIP/2.0/UDP 127.0.0.1:5060;branch=z9hG4bK3060200").unwrap();
        let from = crate::headers::From::from_bytes(b"<sip:alice@127.0.0.1:5060>;tag=8iuy2a").unwrap();
        let to = To::from_bytes(b"<sip:bob@127.0.0.1:5060>").unwrap();

        let mut headers = Headers::new();
        headers.push(crate::headers::Header::Via(via));
        headers.push(crate::headers::Header::From(from));
        headers.push(crate::headers::Header::To(to));
        headers.push(crate::headers::Header::CallId(CallId::new("bs9ki9iqbee8k5kal8mpqb")));
        headers.push(crate::headers::Header::CSeq(CSeq::new(1, SipMethod::Options)));

        let transport: Arc<dyn Transport> = Arc::new(MockUdpTransport::default());
        let addr = OutgoingAddr::Addr {
            addr: transport.addr(),
            transport,
        };
        let response = Response::new_with_headers(code, headers);

        OutgoingResponse {
            response,
            addr,
            buf: None,
        }
    }

    pub fn outgoing_request(method: SipMethod) -> crate::transport::OutgoingRequest<'static> {
        outgoing_request_with(method, Arc::new(MockUdpTransport::default()))
    }

    pub fn outgoing_request_with(
        method: SipMethod,
        transport: Arc<dyn Transport>,
    ) -> crate::transport::OutgoingRequest<'static> {
        let mut parser = Parser::new("sip:registrar.example.com".as_bytes());
        let target = parser.parse_sip_uri(false).unwrap();
        let SipUri::Uri(uri) = target else { unreachable!() };

        let via = Via::from_bytes(b"SIP/2.0/UDP 127.0.0.1:5060;branch=z9hG4bK74bf9").unwrap();
        let from = crate::headers::From::from_bytes(b"<sip:alice@127.0.0.1:5060>;tag=8iuy2a").unwrap();
        let to = To::from_bytes(b"<sip:alice@127.0.0.1:5060>").unwrap();

        let mut headers = Headers::new();
        headers.push(crate::headers::Header::Via(via));
        headers.push(crate::headers::Header::From(from));
        headers.push(crate::headers::Header::To(to));
        headers.push(crate::headers::Header::CallId(CallId::new("bs9ki9iqbee8k5kal8mpqb")));
        headers.push(crate::headers::Header::CSeq(CSeq::new(1, method)));

        crate::transport::OutgoingRequest {
            msg: Request::new_with_headers(method, uri, headers),
            addr: transport.addr(),
            buf: None,
            transport,
        }
    }

    pub fn request(method: SipMethod) -> IncomingRequest<'static> {
        request_with(method, Arc::new(MockUdpTransport::default()))
    }

    pub fn request_with(method: SipMethod, transport: Arc<dyn Transport>) -> IncomingRequest<'static> {
        let mut parser = Parser::new("sip:bob@127.0.0.1:5060".as_bytes());
        let target = parser.parse_sip_uri(false).unwrap();
        let SipUri::Uri(uri) = target else { unreachable!() };

        let via = Via::from_bytes(b"SIP/2.0/UDP 127.0.0.1:5060;branch=z9hG4bK3060200").unwrap();
        let from = crate::headers::From::from_bytes(b"<sip:alice@127.0.0.1:5060>;tag=8iuy2a").unwrap();
        let to = To::from_bytes(b"<sip:bob@127.0.0.1:5060>").unwrap();
        let cseq = CSeq::new(1, method);
        let call_id = CallId::new("bs9ki9iqbee8k5kal8mpqb");

        let packet = Packet {
            payload: Payload::new(Bytes::new()),
            addr: transport.addr(),
            time: SystemTime::now(),
        };

        IncomingRequest {
            request: Request {
                req_line: RequestLine { method, uri },
                headers: Headers::default(),
                body: None,
            },
            transport,
            packet,
            transaction: None,
            request_headers: RequestHeaders {
                via,
                from,
                cseq,
                call_id,
                to,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::message::SipMethod;

    #[tokio::test]
    async fn test_non_invite_server_tsx() {
        let endpoint = mock::default_endpoint();
        let mut req = mock::request(SipMethod::Register);

        endpoint.new_uas_tsx(&mut req);

        let transactions = endpoint.get_tsx_layer();
        let key = req.tsx_key().unwrap().clone();
        let tsx = transactions.find_server_tsx(&key);

        assert!(matches!(tsx.as_ref(), Some(ServerTsx::NonInvite(_))));
        let tsx = match tsx.unwrap() {
            ServerTsx::NonInvite(tsx) => tsx,
            _ => unreachable!(),
        };

        tsx.on_terminated();
        let tsx = transactions.find_server_tsx(&key);

        assert!(tsx.is_none());
    }

    #[tokio::test]
    async fn test_invite_server_tsx() {
        let endpoint = mock::default_endpoint();
        let mut req = mock::request(SipMethod::Invite);

        endpoint.new_uas_inv_tsx(&mut req);

        let transactions = endpoint.get_tsx_layer();
        let key = req.tsx_key().unwrap().clone();
        let tsx = transactions.find_server_tsx(&key);

        assert!(matches!(tsx.as_ref(), Some(ServerTsx::Invite(_))));
        let tsx = match tsx.unwrap() {
            ServerTsx::Invite(tsx) => tsx,
            _ => unreachable!(),
        };

        tsx.on_terminated();
        let tsx = transactions.find_server_tsx(&key);

        assert!(tsx.is_none());
    }
}
