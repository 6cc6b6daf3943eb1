//! SIP User Agent layer.
//!
//! Sits on top of the endpoint as a [`SipService`] and implements
//! an answering machine: every incoming INVITE is accepted with a
//! 200 OK, the caller's audio is recorded to a WAV file named
//! after the Call-ID and echoed straight back, until the peer
//! hangs up or the agent shuts down.
//!
//! Applications observe the agent through a [`UaHandler`] and
//! drive registration through [`Registration`].

mod call;
mod dialog;
mod registration;

pub use call::{Call, CallInfo, CallState};
pub use dialog::{Dialog, DialogId};
pub use registration::{RegState, Registration};

use std::cmp;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::time;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::headers::{Allow, Contact, ContentType, Header};
use crate::media::{MediaConfig, MediaSession, sdp};
use crate::message::{HostPort, SipMethod, SipUri, StatusCode, UriBuilder};
use crate::parser::Parser;
use crate::service::SipService;
use crate::transaction::{T1, T2, TsxUac};
use crate::transport::{IncomingRequest, ToBytes, Transport};

/// An account on a SIP server.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// The user part of the address-of-record.
    pub username: String,
    /// The server host, optionally with a port.
    pub domain: String,
    /// Password used to answer digest challenges. Without one,
    /// challenges end the registration attempt.
    pub password: Option<String>,
    /// Registration expiry requested, in seconds.
    pub expiry: u32,
}

impl AccountConfig {
    /// Creates an account with the default expiry of one hour.
    pub fn new(username: impl Into<String>, domain: impl Into<String>) -> AccountConfig {
        AccountConfig {
            username: username.into(),
            domain: domain.into(),
            password: None,
            expiry: 3600,
        }
    }

    /// Returns the address-of-record, e.g. `sip:alice@example.com`.
    pub fn aor(&self) -> String {
        format!("sip:{}@{}", self.username, self.domain)
    }

    /// Returns the URI of the registrar.
    pub fn registrar_uri(&self) -> String {
        format!("sip:{}", self.domain)
    }
}

/// Configuration of the user agent.
#[derive(Debug, Clone)]
pub struct UaConfig {
    /// The account the agent answers calls for.
    pub account: AccountConfig,
    /// The value of the User-Agent header.
    pub user_agent: String,
    /// The directory call recordings are written to.
    pub recording_dir: PathBuf,
}

impl UaConfig {
    /// Creates a configuration with defaults: recordings go to the
    /// working directory.
    pub fn new(account: AccountConfig) -> UaConfig {
        UaConfig {
            account,
            user_agent: concat!("sipecho/", env!("CARGO_PKG_VERSION")).to_string(),
            recording_dir: PathBuf::from("."),
        }
    }
}

/// Callbacks fired by the user agent.
///
/// Every method has a default, so implementors only override what
/// they care about.
#[async_trait::async_trait]
#[allow(unused_variables)]
pub trait UaHandler: Sync + Send + 'static {
    /// Called after every REGISTER round-trip.
    async fn on_reg_state(&self, state: &RegState) {}

    /// Called when an INVITE arrives, before it is answered.
    ///
    /// Returning `false` declines the call with 486 Busy Here.
    async fn on_incoming_call(&self, call: &CallInfo) -> bool {
        true
    }

    /// Called whenever a call changes state.
    async fn on_call_state(&self, call: &CallInfo) {}

    /// Called when media starts flowing, with the recording path.
    async fn on_call_media(&self, call: &CallInfo, recording: &Path) {}
}

struct Inner {
    config: UaConfig,
    handler: Arc<dyn UaHandler>,
    calls: Mutex<HashMap<DialogId, Call>>,
}

/// The user agent service.
///
/// Registered on an endpoint, it consumes every request the
/// transaction layer did not absorb and runs the call state
/// machine described in the module docs.
#[derive(Clone)]
pub struct UserAgent(Arc<Inner>);

impl UserAgent {
    /// Creates a user agent.
    pub fn new(config: UaConfig, handler: Arc<dyn UaHandler>) -> UserAgent {
        UserAgent(Arc::new(Inner {
            config,
            handler,
            calls: Mutex::new(HashMap::new()),
        }))
    }

    /// Returns the configuration the agent runs with.
    pub fn config(&self) -> &UaConfig {
        &self.0.config
    }

    /// Returns a snapshot of the active calls.
    pub fn calls(&self) -> Vec<Call> {
        self.0
            .calls
            .lock()
            .expect("Lock failed")
            .values()
            .cloned()
            .collect()
    }

    fn find_call(&self, id: &DialogId) -> Option<Call> {
        self.0.calls.lock().expect("Lock failed").get(id).cloned()
    }

    fn add_call(&self, call: Call) {
        self.0
            .calls
            .lock()
            .expect("Lock failed")
            .insert(call.id().clone(), call);
    }

    fn remove_call(&self, id: &DialogId) {
        self.0.calls.lock().expect("Lock failed").remove(id);
    }

    /// Sends a BYE for every active call and tears them down.
    pub async fn hangup_all(&self, endpoint: &Endpoint) {
        for call in self.calls() {
            if let Err(err) = self.hangup(endpoint, &call).await {
                tracing::warn!("Failed to hang up call {}: {}", call.call_id(), err);
            }
        }
    }

    /// Ends a call with an in-dialog BYE.
    ///
    /// The call is torn down locally right away; the answer of the
    /// peer is awaited briefly so that BYE retransmissions get a
    /// chance, but a dead peer does not stall the caller.
    pub async fn hangup(&self, endpoint: &Endpoint, call: &Call) -> Result<()> {
        let branch = crate::generate_branch();
        let sent_by = HostPort::from(advertised_addr(call.dialog().transport().as_ref()));
        let mut request = call.dialog().new_request(SipMethod::Bye, &branch, sent_by)?;

        tracing::info!("Hanging up call {}", call.call_id());
        let tsx = TsxUac::send(endpoint, &mut request).await?;

        self.terminate_call(call).await;

        match time::timeout(T2, tsx.receive_final()).await {
            Ok(Ok(packet)) => {
                if let Some(code) = response_code(packet.payload.buf()) {
                    tracing::debug!("BYE of call {} answered with {}", call.call_id(), code);
                }
            }
            Ok(Err(err)) => {
                tracing::warn!("BYE of call {} failed: {}", call.call_id(), err);
            }
            Err(_) => {
                tracing::warn!("BYE of call {} not answered in time", call.call_id());
            }
        }

        Ok(())
    }

    /// Removes the call, finalizes its recording and notifies the
    /// handler, exactly once.
    async fn terminate_call(&self, call: &Call) {
        self.remove_call(call.id());

        if let Err(err) = call.stop_media().await {
            tracing::warn!(
                "Failed to finalize recording of call {}: {}",
                call.call_id(),
                err
            );
        }

        if call.disconnect() {
            self.0.handler.on_call_state(&call.info()).await;
        }
    }

    async fn on_invite(
        &self,
        endpoint: &Endpoint,
        request: &mut IncomingRequest<'_>,
    ) -> Result<()> {
        // An INVITE with a To tag targets an existing dialog.
        if request.to().tag.is_some() {
            let code = match DialogId::peer_of(request).and_then(|id| self.find_call(&id)) {
                // Session modification is not supported.
                Some(_) => StatusCode::NotAcceptableHere,
                None => StatusCode::CallOrTransactionDoesNotExist,
            };
            let tsx = endpoint.new_uas_inv_tsx(request);
            let mut response = endpoint.new_response(request, code);
            return tsx.respond(&mut response).await;
        }

        // The tag identifying our side of the dialog must match
        // the To tag of the response, which the endpoint derives
        // from the Via branch.
        let Some(branch) = request.via().branch() else {
            tracing::warn!("Rejecting INVITE without a Via branch");
            return endpoint.respond(request, StatusCode::BadRequest).await;
        };
        let local_tag = branch.to_string();

        let dialog = match Dialog::new_uas(request, local_tag) {
            Ok(dialog) => dialog,
            Err(err) => {
                tracing::warn!("Rejecting INVITE: {}", err);
                return endpoint.respond(request, StatusCode::BadRequest).await;
            }
        };

        let recording = self
            .0
            .config
            .recording_dir
            .join(recording_file_name(&dialog.id().call_id));
        let call = Call::new(dialog, recording);

        tracing::info!(
            "Incoming call {} from {}",
            call.call_id(),
            call.info().remote_uri
        );

        let tsx = endpoint.new_uas_inv_tsx(request);

        if !self.0.handler.on_incoming_call(&call.info()).await {
            tracing::info!("Call {} declined", call.call_id());
            let mut busy = endpoint.new_response(request, StatusCode::BusyHere);
            return tsx.respond(&mut busy).await;
        }

        // Quell INVITE retransmissions while the media plane comes
        // up.
        let mut trying = endpoint.new_response(request, StatusCode::Trying);
        tsx.respond(&mut trying).await?;

        let offer = match request.body().map(sdp::AudioOffer::parse) {
            Some(Ok(offer)) => offer,
            Some(Err(err)) => {
                tracing::warn!("Unusable SDP offer on call {}: {}", call.call_id(), err);
                let mut reject = endpoint.new_response(request, StatusCode::NotAcceptableHere);
                return tsx.respond(&mut reject).await;
            }
            None => {
                tracing::warn!("Rejecting offerless INVITE on call {}", call.call_id());
                let mut reject = endpoint.new_response(request, StatusCode::NotAcceptableHere);
                return tsx.respond(&mut reject).await;
            }
        };

        let Some(codec) = offer.negotiate() else {
            tracing::warn!("No common codec on call {}", call.call_id());
            let mut reject = endpoint.new_response(request, StatusCode::NotAcceptableHere);
            return tsx.respond(&mut reject).await;
        };

        let contact_addr = advertised_addr(request.transport().as_ref());
        let media = match MediaSession::start(MediaConfig {
            local_ip: contact_addr.ip(),
            codec,
            remote: offer.addr,
            recording: call.recording().to_path_buf(),
        })
        .await
        {
            Ok(media) => media,
            Err(err) => {
                tracing::error!("Cannot start media for call {}: {}", call.call_id(), err);
                let mut failure = endpoint.new_response(request, StatusCode::ServerInternalError);
                return tsx.respond(&mut failure).await;
            }
        };

        let answer = sdp::build_answer(
            media.local_addr(),
            codec,
            u64::from(rand::random::<u32>()),
        );

        let contact_uri = UriBuilder::new()
            .user(&self.0.config.account.username)
            .host_port(HostPort::from(contact_addr))
            .get();

        let mut ok = endpoint.new_response(request, StatusCode::Ok);
        ok.headers_mut()
            .push(Header::Contact(Contact::new(SipUri::Uri(contact_uri))));
        ok.headers_mut().push(Header::Allow(allowed_methods()));
        ok.headers_mut()
            .push(Header::ContentType(ContentType::new_sdp()));
        ok.set_body(answer.as_bytes());

        // Encoded up front: the transaction consumes the buffer,
        // and the TU keeps retransmitting the same bytes until the
        // ACK arrives.
        let buf = ok.to_bytes()?;
        ok.buf = Some(buf.clone());
        tsx.respond(&mut ok).await?;

        let (ack_tx, ack_rx) = oneshot::channel();
        call.answered(media, ack_tx);
        self.add_call(call.clone());

        self.0.handler.on_call_state(&call.info()).await;
        self.0
            .handler
            .on_call_media(&call.info(), call.recording())
            .await;

        self.retransmit_answer(
            call,
            buf,
            *request.addr(),
            request.transport().clone(),
            ack_rx,
        );

        Ok(())
    }

    /// Retransmits the 2xx until its ACK arrives, as RFC 3261
    /// Section 13.3.1.4 puts on the TU: doubling intervals from T1
    /// capped at T2, giving up after 64*T1.
    fn retransmit_answer(
        &self,
        call: Call,
        buf: Bytes,
        addr: SocketAddr,
        transport: Arc<dyn Transport>,
        mut ack_rx: oneshot::Receiver<()>,
    ) {
        let ua = self.clone();

        tokio::spawn(async move {
            let mut interval = T1;
            let retransmit = time::sleep(interval);
            let deadline = time::sleep(64 * T1);
            tokio::pin!(retransmit, deadline);

            loop {
                tokio::select! {
                    _ = &mut ack_rx => break,
                    _ = &mut deadline => {
                        tracing::warn!(
                            "Call {}: no ACK within {:?}, tearing down",
                            call.call_id(),
                            64 * T1
                        );
                        ua.terminate_call(&call).await;
                        break;
                    }
                    _ = &mut retransmit, if !transport.reliable() => {
                        tracing::trace!("Retransmitting 200 OK of call {}", call.call_id());
                        if let Err(err) = transport.send(&buf, &addr).await {
                            tracing::warn!("Failed to retransmit 200 OK: {}", err);
                        }
                        interval = cmp::min(interval * 2, T2);
                        retransmit.as_mut().reset(time::Instant::now() + interval);
                    }
                }
            }
        });
    }

    async fn on_ack(&self, request: &mut IncomingRequest<'_>) -> Result<()> {
        // Only the ACK of a 2xx reaches the TU; the others are
        // absorbed by the INVITE transaction.
        let call = DialogId::peer_of(request).and_then(|id| self.find_call(&id));

        if let Some(call) = call {
            if call.confirm() {
                tracing::info!("Call {} confirmed", call.call_id());
                self.0.handler.on_call_state(&call.info()).await;
            }
        } else {
            tracing::debug!("ACK for unknown dialog from {}", request.addr());
        }

        Ok(())
    }

    async fn on_bye(&self, endpoint: &Endpoint, request: &mut IncomingRequest<'_>) -> Result<()> {
        let call = DialogId::peer_of(request).and_then(|id| self.find_call(&id));

        let Some(call) = call else {
            let tsx = endpoint.new_uas_tsx(request);
            let mut response =
                endpoint.new_response(request, StatusCode::CallOrTransactionDoesNotExist);
            return tsx.respond(&mut response).await;
        };

        // In-dialog requests must not go back in time.
        if !call.dialog().check_and_update_remote_cseq(request.cseq().cseq) {
            let tsx = endpoint.new_uas_tsx(request);
            let mut response = endpoint.new_response(request, StatusCode::ServerInternalError);
            return tsx.respond(&mut response).await;
        }

        tracing::info!("Call {} hung up by the peer", call.call_id());

        let tsx = endpoint.new_uas_tsx(request);
        let mut response = endpoint.new_response(request, StatusCode::Ok);
        tsx.respond(&mut response).await?;

        self.terminate_call(&call).await;
        Ok(())
    }

    async fn on_cancel(
        &self,
        endpoint: &Endpoint,
        request: &mut IncomingRequest<'_>,
    ) -> Result<()> {
        // Calls are answered the moment they arrive, so the INVITE
        // transaction a CANCEL could match is already gone.
        let tsx = endpoint.new_uas_tsx(request);
        let mut response =
            endpoint.new_response(request, StatusCode::CallOrTransactionDoesNotExist);
        tsx.respond(&mut response).await
    }

    async fn on_options(
        &self,
        endpoint: &Endpoint,
        request: &mut IncomingRequest<'_>,
    ) -> Result<()> {
        let tsx = endpoint.new_uas_tsx(request);
        let mut response = endpoint.new_response(request, StatusCode::Ok);
        let mut capabilities = endpoint.capabilities().clone();
        response.append_headers(&mut capabilities);
        tsx.respond(&mut response).await
    }
}

#[async_trait::async_trait]
impl SipService for UserAgent {
    fn name(&self) -> &str {
        "UserAgent"
    }

    async fn on_incoming_request(
        &self,
        endpoint: &Endpoint,
        request: &mut IncomingRequest,
    ) -> Result<bool> {
        match request.method() {
            SipMethod::Invite => self.on_invite(endpoint, request).await?,
            SipMethod::Ack => self.on_ack(request).await?,
            SipMethod::Bye => self.on_bye(endpoint, request).await?,
            SipMethod::Cancel => self.on_cancel(endpoint, request).await?,
            SipMethod::Options => self.on_options(endpoint, request).await?,
            method => {
                tracing::debug!("Rejecting {} with 501", method);
                endpoint
                    .respond(request, StatusCode::NotImplemented)
                    .await?;
            }
        }

        Ok(true)
    }
}

/// The methods announced in Allow headers.
pub fn allowed_methods() -> Allow {
    let mut allow = Allow::new();
    allow.push(SipMethod::Invite);
    allow.push(SipMethod::Ack);
    allow.push(SipMethod::Bye);
    allow.push(SipMethod::Cancel);
    allow.push(SipMethod::Options);
    allow
}

/// The address put into Contact, Via and SDP. Transports bound to
/// a wildcard address advertise the default route address instead.
pub(crate) fn advertised_addr(transport: &dyn Transport) -> SocketAddr {
    let addr = transport.addr();
    if !addr.ip().is_unspecified() {
        return addr;
    }

    match local_ip_address::local_ip() {
        Ok(ip) => SocketAddr::new(ip, addr.port()),
        Err(_) => addr,
    }
}

/// Maps a Call-ID to a recording file name that stays inside the
/// recording directory no matter what the peer put in the header.
fn recording_file_name(call_id: &str) -> String {
    let mut name: String = call_id
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '.' | '@' | '_' => c,
            _ => '_',
        })
        .collect();

    if name.is_empty() {
        name.push_str("call");
    }
    name.push_str(".wav");
    name
}

fn response_code(buf: &[u8]) -> Option<StatusCode> {
    let msg = Parser::new(buf).parse_sip_msg().ok()?;
    msg.response().map(|response| response.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::net::UdpSocket;

    use crate::endpoint::Builder;
    use crate::message::TransportProtocol;
    use crate::transaction::{TransactionLayer, mock};
    use crate::transport::udp::mock::MockUdpTransport;

    #[derive(Default)]
    struct RecordingHandler {
        decline: bool,
        incoming: Mutex<Vec<String>>,
        call_states: Mutex<Vec<CallState>>,
        media_paths: Mutex<Vec<PathBuf>>,
    }

    #[async_trait::async_trait]
    impl UaHandler for RecordingHandler {
        async fn on_incoming_call(&self, call: &CallInfo) -> bool {
            self.incoming.lock().unwrap().push(call.call_id.clone());
            !self.decline
        }

        async fn on_call_state(&self, call: &CallInfo) {
            self.call_states.lock().unwrap().push(call.state);
        }

        async fn on_call_media(&self, _call: &CallInfo, recording: &Path) {
            self.media_paths.lock().unwrap().push(recording.to_path_buf());
        }
    }

    fn test_ua(handler: Arc<RecordingHandler>, recording_dir: &Path) -> UserAgent {
        let mut config = UaConfig::new(AccountConfig::new("echo", "example.com"));
        config.recording_dir = recording_dir.to_path_buf();
        UserAgent::new(config, handler)
    }

    struct TestAgent {
        endpoint: Endpoint,
        handler: Arc<RecordingHandler>,
        addr: SocketAddr,
        _dir: tempfile::TempDir,
        recording_dir: PathBuf,
    }

    async fn start_agent(handler: RecordingHandler) -> TestAgent {
        let dir = tempfile::tempdir().unwrap();
        let handler = Arc::new(handler);
        let ua = test_ua(handler.clone(), dir.path());

        let endpoint = Builder::new()
            .with_transaction_layer(TransactionLayer::default())
            .add_service(ua)
            .build();
        endpoint.start_udp("127.0.0.1:0").await.unwrap();

        let addr = endpoint
            .transport()
            .find("127.0.0.1:5060".parse().unwrap(), TransportProtocol::Udp)
            .unwrap()
            .addr();
        tokio::spawn(endpoint.clone().run());

        let recording_dir = dir.path().to_path_buf();
        TestAgent {
            endpoint,
            handler,
            addr,
            _dir: dir,
            recording_dir,
        }
    }

    async fn recv_text(socket: &UdpSocket) -> String {
        let mut buf = vec![0u8; 2048];
        let (len, _) = time::timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .expect("Timed out waiting for a message")
            .unwrap();
        String::from_utf8_lossy(&buf[..len]).into_owned()
    }

    async fn recv_until(socket: &UdpSocket, needle: &str) -> String {
        for _ in 0..10 {
            let text = recv_text(socket).await;
            if text.contains(needle) {
                return text;
            }
        }
        panic!("Never received a message containing {:?}", needle);
    }

    async fn wait_for_state(handler: &RecordingHandler, state: CallState) {
        for _ in 0..100 {
            if handler.call_states.lock().unwrap().contains(&state) {
                return;
            }
            time::sleep(Duration::from_millis(50)).await;
        }
        panic!("Call never reached {}", state);
    }

    fn to_tag_of(response: &str) -> String {
        response
            .lines()
            .find(|line| line.starts_with("To:"))
            .and_then(|line| line.split(";tag=").nth(1))
            .expect("To tag missing")
            .trim()
            .to_string()
    }

    fn sdp_media_addr(response: &str) -> SocketAddr {
        let body = response.split("\r\n\r\n").nth(1).expect("No body");
        let ip = body
            .lines()
            .find_map(|line| line.strip_prefix("c=IN IP4 "))
            .expect("No connection line")
            .trim();
        let port = body
            .lines()
            .find_map(|line| line.strip_prefix("m=audio "))
            .and_then(|rest| rest.split_whitespace().next())
            .expect("No media line");
        format!("{}:{}", ip, port).parse().unwrap()
    }

    fn offer_sdp(rtp_port: u16) -> String {
        format!(
            "v=0\r\n\
             o=- 1 1 IN IP4 127.0.0.1\r\n\
             s=-\r\n\
             c=IN IP4 127.0.0.1\r\n\
             t=0 0\r\n\
             m=audio {} RTP/AVP 0 8\r\n\
             a=rtpmap:0 PCMU/8000\r\n\
             a=sendrecv\r\n",
            rtp_port
        )
    }

    fn invite_text(caller: SocketAddr, call_id: &str, rtp_port: u16) -> String {
        let offer = offer_sdp(rtp_port);
        format!(
            "INVITE sip:echo@example.com SIP/2.0\r\n\
             Via: SIP/2.0/UDP {caller};rport;branch=z9hG4bKi-{call_id}\r\n\
             Max-Forwards: 70\r\n\
             From: <sip:caller@{caller}>;tag=ct-{call_id}\r\n\
             To: <sip:echo@example.com>\r\n\
             Call-ID: {call_id}\r\n\
             CSeq: 1 INVITE\r\n\
             Contact: <sip:caller@{caller}>\r\n\
             Content-Type: application/sdp\r\n\
             Content-Length: {len}\r\n\
             \r\n\
             {offer}",
            caller = caller,
            call_id = call_id,
            len = offer.len(),
            offer = offer,
        )
    }

    fn ack_text(caller: SocketAddr, call_id: &str, to_tag: &str) -> String {
        format!(
            "ACK sip:echo@example.com SIP/2.0\r\n\
             Via: SIP/2.0/UDP {caller};rport;branch=z9hG4bKa-{call_id}\r\n\
             Max-Forwards: 70\r\n\
             From: <sip:caller@{caller}>;tag=ct-{call_id}\r\n\
             To: <sip:echo@example.com>;tag={to_tag}\r\n\
             Call-ID: {call_id}\r\n\
             CSeq: 1 ACK\r\n\
             Content-Length: 0\r\n\
             \r\n",
            caller = caller,
            call_id = call_id,
            to_tag = to_tag,
        )
    }

    fn bye_text(caller: SocketAddr, call_id: &str, to_tag: &str) -> String {
        format!(
            "BYE sip:echo@example.com SIP/2.0\r\n\
             Via: SIP/2.0/UDP {caller};rport;branch=z9hG4bKb-{call_id}\r\n\
             Max-Forwards: 70\r\n\
             From: <sip:caller@{caller}>;tag=ct-{call_id}\r\n\
             To: <sip:echo@example.com>;tag={to_tag}\r\n\
             Call-ID: {call_id}\r\n\
             CSeq: 2 BYE\r\n\
             Content-Length: 0\r\n\
             \r\n",
            caller = caller,
            call_id = call_id,
            to_tag = to_tag,
        )
    }

    fn rtp_packet(seq: u16, timestamp: u32, payload: &[u8]) -> Vec<u8> {
        let mut pkt = vec![0u8; 12 + payload.len()];
        pkt[0] = 0x80;
        pkt[1] = 0x00; // PCMU
        pkt[2..4].copy_from_slice(&seq.to_be_bytes());
        pkt[4..8].copy_from_slice(&timestamp.to_be_bytes());
        pkt[8..12].copy_from_slice(&0xdecafbadu32.to_be_bytes());
        pkt[12..].copy_from_slice(payload);
        pkt
    }

    #[test_log::test(tokio::test)]
    async fn test_answers_call_records_and_echoes() {
        let agent = start_agent(RecordingHandler::default()).await;
        let caller = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let rtp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let caller_addr = caller.local_addr().unwrap();
        let rtp_port = rtp.local_addr().unwrap().port();

        let invite = invite_text(caller_addr, "call-1", rtp_port);
        caller.send_to(invite.as_bytes(), agent.addr).await.unwrap();

        let ok = recv_until(&caller, "SIP/2.0 200 OK").await;
        assert!(ok.contains("Content-Type: application/sdp"));
        assert!(ok.contains("a=rtpmap:0 PCMU/8000"));
        assert!(ok.contains("Contact:"));

        let to_tag = to_tag_of(&ok);
        let media_addr = sdp_media_addr(&ok);

        let ack = ack_text(caller_addr, "call-1", &to_tag);
        caller.send_to(ack.as_bytes(), agent.addr).await.unwrap();
        wait_for_state(&agent.handler, CallState::Confirmed).await;

        // One 20ms PCMU frame, echoed back verbatim.
        let payload: Vec<u8> = (0..160u32).map(|i| i as u8).collect();
        let pkt = rtp_packet(1, 0, &payload);
        rtp.send_to(&pkt, media_addr).await.unwrap();

        let mut echo = vec![0u8; 2048];
        let (len, src) = time::timeout(Duration::from_secs(5), rtp.recv_from(&mut echo))
            .await
            .expect("No echo received")
            .unwrap();
        assert_eq!(src, media_addr);
        assert_eq!(&echo[12..len], payload.as_slice());
        // First echoed packet carries the marker bit.
        assert_eq!(echo[1], 0x80);

        let bye = bye_text(caller_addr, "call-1", &to_tag);
        caller.send_to(bye.as_bytes(), agent.addr).await.unwrap();
        let bye_ok = recv_until(&caller, "CSeq: 2 BYE").await;
        assert!(bye_ok.contains("SIP/2.0 200 OK"));

        wait_for_state(&agent.handler, CallState::Disconnected).await;

        // The recording holds exactly the samples that were sent.
        let wav = agent.recording_dir.join("call-1.wav");
        let reader = hound::WavReader::open(&wav).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 160);

        assert_eq!(
            agent.handler.incoming.lock().unwrap().as_slice(),
            ["call-1".to_string()]
        );
        assert_eq!(
            agent.handler.media_paths.lock().unwrap().as_slice(),
            [wav.clone()]
        );
        let states = agent.handler.call_states.lock().unwrap().clone();
        assert_eq!(
            states,
            [
                CallState::Connecting,
                CallState::Confirmed,
                CallState::Disconnected
            ]
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_retransmitted_invite_gets_one_call() {
        let agent = start_agent(RecordingHandler::default()).await;
        let caller = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let caller_addr = caller.local_addr().unwrap();

        let invite = invite_text(caller_addr, "call-2", 40000);
        caller.send_to(invite.as_bytes(), agent.addr).await.unwrap();
        let ok = recv_until(&caller, "SIP/2.0 200 OK").await;

        // A retransmission of the same INVITE is absorbed by the
        // transaction, not answered as a second call.
        caller.send_to(invite.as_bytes(), agent.addr).await.unwrap();
        recv_until(&caller, "SIP/2.0 200 OK").await;
        assert_eq!(agent.handler.incoming.lock().unwrap().len(), 1);

        let ack = ack_text(caller_addr, "call-2", &to_tag_of(&ok));
        caller.send_to(ack.as_bytes(), agent.addr).await.unwrap();
        wait_for_state(&agent.handler, CallState::Confirmed).await;
    }

    #[test_log::test(tokio::test)]
    async fn test_handler_can_decline_call() {
        let handler = RecordingHandler {
            decline: true,
            ..Default::default()
        };
        let agent = start_agent(handler).await;
        let caller = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let caller_addr = caller.local_addr().unwrap();

        let invite = invite_text(caller_addr, "call-3", 40000);
        caller.send_to(invite.as_bytes(), agent.addr).await.unwrap();

        recv_until(&caller, "SIP/2.0 486").await;
        assert!(agent.handler.call_states.lock().unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_reinvite_is_rejected_with_488() {
        let agent = start_agent(RecordingHandler::default()).await;
        let caller = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let caller_addr = caller.local_addr().unwrap();

        let invite = invite_text(caller_addr, "call-4", 40000);
        caller.send_to(invite.as_bytes(), agent.addr).await.unwrap();
        let ok = recv_until(&caller, "SIP/2.0 200 OK").await;
        let to_tag = to_tag_of(&ok);

        let ack = ack_text(caller_addr, "call-4", &to_tag);
        caller.send_to(ack.as_bytes(), agent.addr).await.unwrap();
        wait_for_state(&agent.handler, CallState::Confirmed).await;

        let offer = offer_sdp(40002);
        let reinvite = format!(
            "INVITE sip:echo@example.com SIP/2.0\r\n\
             Via: SIP/2.0/UDP {caller};rport;branch=z9hG4bKr-call-4\r\n\
             Max-Forwards: 70\r\n\
             From: <sip:caller@{caller}>;tag=ct-call-4\r\n\
             To: <sip:echo@example.com>;tag={to_tag}\r\n\
             Call-ID: call-4\r\n\
             CSeq: 2 INVITE\r\n\
             Content-Type: application/sdp\r\n\
             Content-Length: {len}\r\n\
             \r\n\
             {offer}",
            caller = caller_addr,
            to_tag = to_tag,
            len = offer.len(),
            offer = offer,
        );
        caller.send_to(reinvite.as_bytes(), agent.addr).await.unwrap();
        recv_until(&caller, "SIP/2.0 488").await;
    }

    #[test_log::test(tokio::test)]
    async fn test_invite_without_codec_is_rejected() {
        let agent = start_agent(RecordingHandler::default()).await;
        let caller = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let caller_addr = caller.local_addr().unwrap();

        // G.729 only, which this agent does not speak.
        let offer = "v=0\r\n\
                     o=- 1 1 IN IP4 127.0.0.1\r\n\
                     s=-\r\n\
                     c=IN IP4 127.0.0.1\r\n\
                     t=0 0\r\n\
                     m=audio 40000 RTP/AVP 18\r\n";
        let invite = format!(
            "INVITE sip:echo@example.com SIP/2.0\r\n\
             Via: SIP/2.0/UDP {caller};rport;branch=z9hG4bKi-call-5\r\n\
             Max-Forwards: 70\r\n\
             From: <sip:caller@{caller}>;tag=ct-call-5\r\n\
             To: <sip:echo@example.com>\r\n\
             Call-ID: call-5\r\n\
             CSeq: 1 INVITE\r\n\
             Content-Type: application/sdp\r\n\
             Content-Length: {len}\r\n\
             \r\n\
             {offer}",
            caller = caller_addr,
            len = offer.len(),
            offer = offer,
        );
        caller.send_to(invite.as_bytes(), agent.addr).await.unwrap();
        recv_until(&caller, "SIP/2.0 488").await;
    }

    #[tokio::test]
    async fn test_unsupported_method_is_rejected() {
        let endpoint = mock::default_endpoint();
        let transport = Arc::new(MockUdpTransport::default());

        let dir = tempfile::tempdir().unwrap();
        let ua = test_ua(Arc::new(RecordingHandler::default()), dir.path());

        let mut request = mock::request_with(SipMethod::Register, transport.clone());
        request.request_headers.via.set_received("127.0.0.1".parse().unwrap());
        let handled = ua.on_incoming_request(&endpoint, &mut request).await.unwrap();

        assert!(handled);
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_bye_without_dialog_gets_481() {
        let endpoint = mock::default_endpoint();
        let transport = Arc::new(MockUdpTransport::default());

        let dir = tempfile::tempdir().unwrap();
        let ua = test_ua(Arc::new(RecordingHandler::default()), dir.path());

        let mut request = mock::request_with(SipMethod::Bye, transport.clone());
        request.request_headers.to.set_tag("nosuch");
        ua.on_incoming_request(&endpoint, &mut request).await.unwrap();

        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_without_transaction_gets_481() {
        let endpoint = mock::default_endpoint();
        let transport = Arc::new(MockUdpTransport::default());

        let dir = tempfile::tempdir().unwrap();
        let ua = test_ua(Arc::new(RecordingHandler::default()), dir.path());

        let mut request = mock::request_with(SipMethod::Cancel, transport.clone());
        ua.on_incoming_request(&endpoint, &mut request).await.unwrap();

        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_options_is_answered() {
        let endpoint = mock::default_endpoint();
        let transport = Arc::new(MockUdpTransport::default());

        let dir = tempfile::tempdir().unwrap();
        let ua = test_ua(Arc::new(RecordingHandler::default()), dir.path());

        let mut request = mock::request_with(SipMethod::Options, transport.clone());
        ua.on_incoming_request(&endpoint, &mut request).await.unwrap();

        assert_eq!(transport.sent_count(), 1);
    }

    #[test]
    fn test_recording_file_name_stays_in_directory() {
        assert_eq!(recording_file_name("abc-123@host"), "abc-123@host.wav");
        assert_eq!(
            recording_file_name("../../etc/passwd"),
            ".._.._etc_passwd.wav"
        );
        assert_eq!(recording_file_name(""), "call.wav");
    }

    #[test]
    fn test_allowed_methods_listed() {
        let allow = allowed_methods();
        assert_eq!(
            allow.to_string(),
            "Allow: INVITE, ACK, BYE, CANCEL, OPTIONS"
        );
    }
}
