use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use uuid::Uuid;

use super::{AccountConfig, UaConfig, UaHandler, advertised_addr};
use crate::auth::Credentials;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::find_map_header;
use crate::headers::{
    self, Authorization, CSeq, CallId, Contact, Expires, Header, Headers, MaxForwards, To, Via,
};
use crate::message::{
    Credential, DigestCredential, HostPort, Request, Response, SipMethod, SipUri, StatusCode,
    TransportProtocol, UriBuilder,
};
use crate::parser::Parser;
use crate::transaction::TsxUac;
use crate::transport::{OutgoingRequest, Packet, Transport};

/// The outcome of a REGISTER round-trip, handed to
/// [`UaHandler::on_reg_state`].
#[derive(Debug, Clone)]
pub struct RegState {
    /// The final status code of the registration.
    pub code: StatusCode,
    /// The reason phrase that came with it.
    pub reason: String,
    /// The expiry granted by the registrar, in seconds.
    pub expiry: u32,
    /// Whether the binding is active after this round-trip.
    pub registered: bool,
}

// Challenge data owned for the retried request, since the
// original response is gone by the time it is built.
struct AuthRetry {
    realm: String,
    nonce: String,
    opaque: Option<String>,
    uri: String,
    answer: crate::auth::DigestAnswer,
}

struct Inner {
    endpoint: Endpoint,
    account: AccountConfig,
    user_agent: String,
    handler: Arc<dyn UaHandler>,
    /// Resolved address of the registrar.
    registrar: SocketAddr,
    transport: Arc<dyn Transport>,
    /// Address advertised in Contact and Via.
    contact_addr: SocketAddr,
    // Call-ID and From tag are fixed for the lifetime of the
    // binding, only the CSeq advances.
    call_id: String,
    from_tag: String,
    cseq: AtomicU32,
    registered: AtomicBool,
    refresh: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.refresh.lock().expect("Lock failed").take() {
            handle.abort();
        }
    }
}

/// A registration binding with a SIP registrar.
///
/// Keeps the binding alive by re-registering halfway through the
/// granted expiry, and answers one digest challenge per attempt
/// when the account has a password.
#[derive(Clone)]
pub struct Registration(Arc<Inner>);

impl Registration {
    /// Creates a registration for the given account.
    ///
    /// Resolves the registrar and picks the transport to reach
    /// it, but does not send anything yet.
    pub async fn new(
        endpoint: &Endpoint,
        config: &UaConfig,
        handler: Arc<dyn UaHandler>,
    ) -> Result<Registration> {
        let host_port: HostPort = config.account.domain.parse().map_err(Error::ParseError)?;
        let registrar = endpoint.resolve_host_port(&host_port).await?;

        let transport = endpoint
            .transport()
            .find(registrar, TransportProtocol::Udp)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("No transport able to reach registrar {}", registrar),
                )
            })?;
        let contact_addr = advertised_addr(transport.as_ref());

        Ok(Registration(Arc::new(Inner {
            endpoint: endpoint.clone(),
            account: config.account.clone(),
            user_agent: config.user_agent.clone(),
            handler,
            registrar,
            transport,
            contact_addr,
            call_id: Uuid::new_v4().to_string(),
            from_tag: crate::generate_tag(),
            cseq: AtomicU32::new(0),
            registered: AtomicBool::new(false),
            refresh: Mutex::new(None),
        })))
    }

    /// Registers the account and starts the refresh cycle.
    pub async fn register(&self) -> Result<RegState> {
        let state = self.request_registration(self.0.account.expiry).await?;
        if state.registered {
            self.schedule_refresh(state.expiry);
        }
        self.0.handler.on_reg_state(&state).await;
        Ok(state)
    }

    /// Removes the binding by registering with an expiry of zero.
    pub async fn unregister(&self) -> Result<RegState> {
        self.cancel_refresh();
        let state = self.request_registration(0).await?;
        self.0.handler.on_reg_state(&state).await;
        Ok(state)
    }

    /// Returns whether the binding is currently active.
    pub fn registered(&self) -> bool {
        self.0.registered.load(Ordering::SeqCst)
    }

    /// Returns the address-of-record this registration binds.
    pub fn aor(&self) -> String {
        self.0.account.aor()
    }

    async fn request_registration(&self, expiry: u32) -> Result<RegState> {
        let packet = self.send_register(expiry, None).await?;
        let msg = Parser::new(packet.payload.buf()).parse_sip_msg()?;
        let response = msg
            .response()
            .ok_or_else(|| Error::ParseError("REGISTER answered with a request".into()))?;

        if response.code() == StatusCode::Unauthorized {
            if let Some(credentials) = self.credentials() {
                let challenge =
                    find_map_header!(response.headers, WWWAuthenticate).and_then(|www| www.digest());

                if let Some(challenge) = challenge {
                    tracing::debug!(realm = ?challenge.realm, "Answering registrar challenge");

                    let uri = self.0.account.registrar_uri();
                    let answer = credentials.answer(challenge, SipMethod::Register, &uri)?;
                    let auth = AuthRetry {
                        realm: challenge.realm.unwrap_or_default().to_string(),
                        nonce: challenge.nonce.unwrap_or_default().to_string(),
                        opaque: challenge.opaque.map(str::to_string),
                        uri,
                        answer,
                    };

                    let packet = self.send_register(expiry, Some(&auth)).await?;
                    let msg = Parser::new(packet.payload.buf()).parse_sip_msg()?;
                    let response = msg
                        .response()
                        .ok_or_else(|| Error::ParseError("REGISTER answered with a request".into()))?;

                    return Ok(self.state_of(response, expiry));
                }
            }
        }

        Ok(self.state_of(response, expiry))
    }

    fn credentials(&self) -> Option<Credentials> {
        let password = self.0.account.password.as_deref()?;
        Some(Credentials::new(&self.0.account.username, password))
    }

    fn state_of(&self, response: &Response<'_>, requested_expiry: u32) -> RegState {
        let code = response.code();

        // Registrars grant the expiry either in an Expires header
        // or as a parameter of the returned Contact.
        let granted = find_map_header!(response.headers, Expires)
            .map(|expires| expires.as_u32())
            .or_else(|| {
                find_map_header!(response.headers, Contact).and_then(|contact| contact.expires())
            })
            .unwrap_or(requested_expiry);

        let registered = code.is_success() && requested_expiry > 0;
        self.0.registered.store(registered, Ordering::SeqCst);

        RegState {
            code,
            reason: response.reason().to_string(),
            expiry: granted,
            registered,
        }
    }

    async fn send_register(&self, expiry: u32, auth: Option<&AuthRetry>) -> Result<Packet> {
        let this = &self.0;
        let cseq = this.cseq.fetch_add(1, Ordering::SeqCst) + 1;
        let branch = crate::generate_branch();

        let registrar_uri = this.account.registrar_uri();
        let aor = this.account.aor();

        let uri = match Parser::new(registrar_uri.as_bytes()).parse_sip_uri(false)? {
            SipUri::Uri(uri) => uri,
            SipUri::NameAddr(name_addr) => name_addr.uri,
        };
        let from_uri = Parser::new(aor.as_bytes()).parse_sip_uri(false)?;
        let to_uri = Parser::new(aor.as_bytes()).parse_sip_uri(false)?;

        let contact_uri = UriBuilder::new()
            .user(&this.account.username)
            .host_port(HostPort::from(this.contact_addr))
            .get();

        let mut headers: Headers = vec![
            Header::Via(Via::new_udp(HostPort::from(this.contact_addr), &branch)),
            Header::MaxForwards(MaxForwards::new(70)),
            Header::From(headers::From::new(from_uri, &this.from_tag)),
            Header::To(To::new(to_uri)),
            Header::CallId(CallId::new(&this.call_id)),
            Header::CSeq(CSeq::new(cseq, SipMethod::Register)),
            Header::Contact(Contact::new(SipUri::Uri(contact_uri))),
            Header::Expires(Expires::new(expiry)),
            Header::UserAgent(headers::UserAgent::new(&this.user_agent)),
        ]
        .into();

        if let Some(auth) = auth {
            headers.push(Header::Authorization(Authorization(Credential::Digest(
                DigestCredential {
                    realm: Some(&auth.realm),
                    username: Some(&this.account.username),
                    nonce: Some(&auth.nonce),
                    uri: Some(&auth.uri),
                    response: Some(&auth.answer.response),
                    algorithm: Some("MD5"),
                    cnonce: auth.answer.cnonce.as_deref(),
                    opaque: auth.opaque.as_deref(),
                    qop: auth.answer.qop,
                    nc: auth.answer.nc,
                },
            ))));
        }

        let mut request = OutgoingRequest {
            msg: Request::new_with_headers(SipMethod::Register, uri, headers),
            addr: this.registrar,
            buf: None,
            transport: this.transport.clone(),
        };

        tracing::info!(
            "Registering {} at {} (expiry {}s, cseq {})",
            aor,
            this.registrar,
            expiry,
            cseq
        );

        let tsx = TsxUac::send(&this.endpoint, &mut request).await?;
        tsx.receive_final().await
    }

    fn schedule_refresh(&self, expiry: u32) {
        if expiry == 0 {
            return;
        }

        // Halfway through the granted lifetime, as pjsip does.
        let interval = Duration::from_secs(u64::from(expiry) / 2).max(Duration::from_secs(1));
        let registration = self.clone();

        let handle = tokio::spawn(async move {
            loop {
                time::sleep(interval).await;
                tracing::debug!("Refreshing registration of {}", registration.aor());

                match registration
                    .request_registration(registration.0.account.expiry)
                    .await
                {
                    Ok(state) => {
                        let lost = !state.registered;
                        registration.0.handler.on_reg_state(&state).await;
                        if lost {
                            tracing::warn!(
                                "Registration of {} rejected with {}, giving up refreshing",
                                registration.aor(),
                                state.code
                            );
                            break;
                        }
                    }
                    Err(err) => {
                        // Transient failures are retried on the
                        // next tick.
                        tracing::warn!("Registration refresh failed: {}", err);
                    }
                }
            }
        });

        let old = self.0.refresh.lock().expect("Lock failed").replace(handle);
        if let Some(old) = old {
            old.abort();
        }
    }

    fn cancel_refresh(&self) {
        if let Some(handle) = self.0.refresh.lock().expect("Lock failed").take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::endpoint::Builder;
    use crate::headers::{SipHeaderParse, WWWAuthenticate};
    use crate::service::SipService;
    use crate::transaction::TransactionLayer;
    use crate::transport::IncomingRequest;

    #[derive(Default)]
    struct RegistrarLog {
        expires: Mutex<Vec<u32>>,
        usernames: Mutex<Vec<String>>,
        nonces: Mutex<Vec<String>>,
    }

    /// A registrar that answers REGISTER requests, optionally
    /// challenging the first attempt.
    #[derive(Clone)]
    struct MockRegistrar {
        challenge: bool,
        granted: Option<u32>,
        log: Arc<RegistrarLog>,
    }

    impl MockRegistrar {
        fn new(challenge: bool, granted: Option<u32>) -> MockRegistrar {
            MockRegistrar {
                challenge,
                granted,
                log: Arc::new(RegistrarLog::default()),
            }
        }
    }

    #[async_trait::async_trait]
    impl SipService for MockRegistrar {
        fn name(&self) -> &str {
            "MockRegistrar"
        }

        async fn on_incoming_request(
            &self,
            endpoint: &Endpoint,
            request: &mut IncomingRequest,
        ) -> Result<bool> {
            if !request.is_method(SipMethod::Register) {
                return Ok(false);
            }

            let authorized = {
                if let Some(expires) = find_map_header!(request.request.headers, Expires) {
                    self.log.expires.lock().unwrap().push(expires.as_u32());
                }

                let authorization = find_map_header!(request.request.headers, Authorization);
                if let Some(Credential::Digest(digest)) =
                    authorization.map(|auth| auth.credential())
                {
                    self.log
                        .usernames
                        .lock()
                        .unwrap()
                        .push(digest.username.unwrap_or_default().to_string());
                    self.log
                        .nonces
                        .lock()
                        .unwrap()
                        .push(digest.nonce.unwrap_or_default().to_string());
                }

                authorization.is_some() || !self.challenge
            };

            let tsx = endpoint.new_uas_tsx(request);

            if authorized {
                let mut ok = endpoint.new_response(request, StatusCode::Ok);
                if let Some(granted) = self.granted {
                    ok.headers_mut().push(Header::Expires(Expires::new(granted)));
                }
                tsx.respond(&mut ok).await?;
            } else {
                let www = WWWAuthenticate::from_bytes(
                    b"Digest realm=\"sipecho.test\", \
                      nonce=\"f84f1cec41e6cbe5aea9c8e88d359\", \
                      algorithm=MD5, qop=\"auth\"",
                )?;
                let mut unauthorized = endpoint.new_response(request, StatusCode::Unauthorized);
                unauthorized.headers_mut().push(Header::WWWAuthenticate(www));
                tsx.respond(&mut unauthorized).await?;
            }

            Ok(true)
        }
    }

    #[derive(Default)]
    struct StateLog {
        states: Mutex<Vec<RegState>>,
    }

    #[async_trait::async_trait]
    impl UaHandler for StateLog {
        async fn on_reg_state(&self, state: &RegState) {
            self.states.lock().unwrap().push(state.clone());
        }
    }

    struct TestReg {
        registration: Registration,
        handler: Arc<StateLog>,
        registrar: MockRegistrar,
    }

    async fn setup(registrar: MockRegistrar, password: Option<&str>) -> TestReg {
        let server = Builder::new()
            .with_transaction_layer(TransactionLayer::default())
            .add_service(registrar.clone())
            .build();
        server.start_udp("127.0.0.1:0").await.unwrap();
        let server_addr = server
            .transport()
            .find("127.0.0.1:5060".parse().unwrap(), TransportProtocol::Udp)
            .unwrap()
            .addr();
        tokio::spawn(server.run());

        let client = Builder::new()
            .with_transaction_layer(TransactionLayer::default())
            .build();
        client.start_udp("127.0.0.1:0").await.unwrap();
        tokio::spawn(client.clone().run());

        let mut account = AccountConfig::new("carol", server_addr.to_string());
        account.password = password.map(str::to_string);
        let config = UaConfig::new(account);

        let handler = Arc::new(StateLog::default());
        let registration = Registration::new(&client, &config, handler.clone())
            .await
            .unwrap();

        TestReg {
            registration,
            handler,
            registrar,
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_register_round_trip() {
        let reg = setup(MockRegistrar::new(false, Some(120)), None).await;

        let state = time::timeout(Duration::from_secs(5), reg.registration.register())
            .await
            .expect("REGISTER not answered")
            .unwrap();

        assert_eq!(state.code, StatusCode::Ok);
        assert!(state.registered);
        assert_eq!(state.expiry, 120);
        assert!(reg.registration.registered());
        assert_eq!(reg.registrar.log.expires.lock().unwrap().as_slice(), [3600]);
        assert_eq!(reg.handler.states.lock().unwrap().len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_register_answers_challenge() {
        let reg = setup(MockRegistrar::new(true, None), Some("s3cret")).await;

        let state = time::timeout(Duration::from_secs(5), reg.registration.register())
            .await
            .expect("REGISTER not answered")
            .unwrap();

        assert_eq!(state.code, StatusCode::Ok);
        assert!(state.registered);
        assert_eq!(
            reg.registrar.log.usernames.lock().unwrap().as_slice(),
            ["carol".to_string()]
        );
        assert_eq!(
            reg.registrar.log.nonces.lock().unwrap().as_slice(),
            ["f84f1cec41e6cbe5aea9c8e88d359".to_string()]
        );
        assert_eq!(
            reg.registrar.log.expires.lock().unwrap().as_slice(),
            [3600, 3600]
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_challenge_without_password_fails() {
        let reg = setup(MockRegistrar::new(true, None), None).await;

        let state = time::timeout(Duration::from_secs(5), reg.registration.register())
            .await
            .expect("REGISTER not answered")
            .unwrap();

        assert_eq!(state.code, StatusCode::Unauthorized);
        assert!(!state.registered);
        assert!(!reg.registration.registered());
    }

    #[test_log::test(tokio::test)]
    async fn test_refresh_reregisters_before_expiry() {
        let reg = setup(MockRegistrar::new(false, Some(2)), None).await;

        time::timeout(Duration::from_secs(5), reg.registration.register())
            .await
            .expect("REGISTER not answered")
            .unwrap();

        // A two second grant schedules the first refresh after one
        // second, so the registrar hears from us again well before
        // the sleep below runs out.
        time::sleep(Duration::from_millis(1800)).await;

        assert!(reg.registration.registered());
        assert!(reg.registrar.log.expires.lock().unwrap().len() >= 2);
        assert!(reg.handler.states.lock().unwrap().len() >= 2);
    }

    #[test_log::test(tokio::test)]
    async fn test_unregister_clears_binding() {
        let reg = setup(MockRegistrar::new(false, None), None).await;

        time::timeout(Duration::from_secs(5), reg.registration.register())
            .await
            .expect("REGISTER not answered")
            .unwrap();
        assert!(reg.registration.registered());

        let state = time::timeout(Duration::from_secs(5), reg.registration.unregister())
            .await
            .expect("Unregister not answered")
            .unwrap();

        assert_eq!(state.code, StatusCode::Ok);
        assert!(!state.registered);
        assert_eq!(state.expiry, 0);
        assert!(!reg.registration.registered());
        assert_eq!(
            reg.registrar.log.expires.lock().unwrap().as_slice(),
            [3600, 0]
        );
        assert_eq!(reg.handler.states.lock().unwrap().len(), 2);
    }
}
