use std::sync::Arc;

use crate::message::{HostPort, SipMethod};
use crate::transport::IncomingRequest;
use crate::BRANCH_COOKIE;

/// Uniquely identifies a transaction within the
/// [`TransactionLayer`](super::TransactionLayer).
///
/// Requests from RFC 3261 compliant peers carry a branch
/// parameter starting with the magic cookie and are matched by
/// branch alone; anything else falls back to the header tuple
/// match of RFC 2543.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum TsxKey {
    /// A key built from the pre–RFC 3261 header tuple.
    Rfc2543(Rfc2543Key),
    /// A key built from the magic-cookie branch parameter.
    Rfc3261(Rfc3261Key),
}

impl TsxKey {
    pub(crate) fn create_client(method: SipMethod, branch: &str) -> Self {
        TsxKey::Rfc3261(Rfc3261Key::Client(ClientKey {
            branch: branch.into(),
            method,
        }))
    }

    pub(crate) fn create_server(request: &IncomingRequest) -> Self {
        // An ACK matches the INVITE transaction it acknowledges.
        let method = match request.cseq().method {
            SipMethod::Ack => SipMethod::Invite,
            method => method,
        };
        let via = request.via();

        match via.branch() {
            Some(branch) if branch.starts_with(BRANCH_COOKIE) => TsxKey::Rfc3261(Rfc3261Key::Server(ServerKey {
                branch: branch.into(),
                via_sent_by: via.sent_by().clone(),
                method,
            })),
            _ => TsxKey::Rfc2543(Rfc2543Key {
                cseq: request.cseq().cseq,
                from_tag: request.from().tag.map(Arc::from),
                call_id: Arc::from(request.call_id().as_str()),
                via_host_port: via.sent_by().clone(),
                method,
            }),
        }
    }
}

/// Transaction key for requests without a magic-cookie branch.
///
/// The To tag is left out of the tuple so an ACK can match the
/// INVITE transaction it acknowledges.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct Rfc2543Key {
    cseq: u32,
    from_tag: Option<Arc<str>>,
    call_id: Arc<str>,
    via_host_port: HostPort,
    method: SipMethod,
}

/// Transaction key for requests carrying a magic-cookie branch.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum Rfc3261Key {
    /// Key of a client transaction.
    Client(ClientKey),
    /// Key of a server transaction.
    Server(ServerKey),
}

/// Client transaction key (RFC 3261 section 17.1.3).
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct ClientKey {
    branch: Arc<str>,
    method: SipMethod,
}

/// Server transaction key (RFC 3261 section 17.2.3).
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct ServerKey {
    branch: Arc<str>,
    via_sent_by: HostPort,
    method: SipMethod,
}
