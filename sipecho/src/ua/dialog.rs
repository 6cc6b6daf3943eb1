use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Error, Result};
use crate::headers::{self, CSeq, CallId, Header, Headers, MaxForwards, To, Via};
use crate::message::{HostPort, Request, SipMethod, SipUri};
use crate::parser::Parser;
use crate::transport::{IncomingRequest, OutgoingRequest, Transport};

/// Identifies a dialog.
///
/// A dialog is identified by the Call-ID together with the local
/// and the remote tag, as described in [RFC 3261 Section 12].
///
/// [RFC 3261 Section 12]: https://datatracker.ietf.org/doc/html/rfc3261#section-12
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialogId {
    /// The Call-ID of the dialog.
    pub call_id: String,
    /// The tag this user agent contributed.
    pub local_tag: String,
    /// The tag the peer contributed.
    pub remote_tag: String,
}

impl DialogId {
    /// Builds the id carried by an in-dialog request from the
    /// peer, that is, with our tag in `To` and the peer's tag in
    /// `From`.
    ///
    /// Returns `None` if either tag is missing, in which case the
    /// request cannot belong to any established dialog.
    pub fn peer_of(request: &IncomingRequest<'_>) -> Option<DialogId> {
        let local_tag = request.to().tag?;
        let remote_tag = request.from().tag?;

        Some(DialogId {
            call_id: request.call_id().as_str().to_string(),
            local_tag: local_tag.to_string(),
            remote_tag: remote_tag.to_string(),
        })
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};local={};remote={}",
            self.call_id, self.local_tag, self.remote_tag
        )
    }
}

struct Inner {
    id: DialogId,
    // URIs are kept in their printed form. In-dialog requests are
    // built rarely, so they are reparsed on demand instead of
    // fighting the borrow of the packet they came from.
    local_uri: String,
    remote_uri: String,
    remote_target: String,
    // Source address of the request that created the dialog. The
    // peer may be behind a NAT, so in-dialog requests go back to
    // where the INVITE came from rather than to the URI.
    remote_addr: SocketAddr,
    transport: Arc<dyn Transport>,
    local_cseq: AtomicU32,
    remote_cseq: AtomicU32,
}

/// A confirmed UAS dialog.
///
/// Stores the state of [RFC 3261 Section 12.1.1]: the route set is
/// not kept since this user agent never sits behind a proxy chain
/// that record-routes.
///
/// [RFC 3261 Section 12.1.1]: https://datatracker.ietf.org/doc/html/rfc3261#section-12.1.1
#[derive(Clone)]
pub struct Dialog(Arc<Inner>);

impl Dialog {
    /// Creates a dialog from an incoming request, taking the UAS
    /// side.
    ///
    /// `local_tag` must be the tag that will go into the `To`
    /// header of the response establishing the dialog.
    pub fn new_uas(request: &IncomingRequest<'_>, local_tag: String) -> Result<Dialog> {
        let remote_tag = request
            .from()
            .tag
            .ok_or(Error::MissingRequiredHeader("From tag"))?;

        let id = DialogId {
            call_id: request.call_id().as_str().to_string(),
            local_tag,
            remote_tag: remote_tag.to_string(),
        };

        // The remote target is the Contact, when the peer supplied
        // one. Otherwise fall back to the From URI.
        let remote_target = request
            .contact()
            .and_then(|contact| contact.uri())
            .map(|uri| uri.uri().without_params().to_string())
            .unwrap_or_else(|| request.from().uri.uri().without_params().to_string());

        Ok(Dialog(Arc::new(Inner {
            id,
            local_uri: request.to().uri.uri().without_params().to_string(),
            remote_uri: request.from().uri.uri().without_params().to_string(),
            remote_target,
            remote_addr: *request.addr(),
            transport: request.transport().clone(),
            local_cseq: AtomicU32::new(0),
            remote_cseq: AtomicU32::new(request.cseq().cseq),
        })))
    }

    /// Returns the dialog id.
    pub fn id(&self) -> &DialogId {
        &self.0.id
    }

    /// Returns the local URI in its printed form.
    pub fn local_uri(&self) -> &str {
        &self.0.local_uri
    }

    /// Returns the remote URI in its printed form.
    pub fn remote_uri(&self) -> &str {
        &self.0.remote_uri
    }

    /// Returns the address in-dialog requests are sent to.
    pub fn remote_addr(&self) -> SocketAddr {
        self.0.remote_addr
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.0.transport
    }

    /// Checks the CSeq of an in-dialog request against the highest
    /// sequence number seen so far, as required by [RFC 3261
    /// Section 12.2.2], and remembers it when it is acceptable.
    ///
    /// [RFC 3261 Section 12.2.2]: https://datatracker.ietf.org/doc/html/rfc3261#section-12.2.2
    pub fn check_and_update_remote_cseq(&self, cseq: u32) -> bool {
        let mut current = self.0.remote_cseq.load(Ordering::SeqCst);

        loop {
            if cseq < current {
                return false;
            }
            match self.0.remote_cseq.compare_exchange(
                current,
                cseq,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(seen) => current = seen,
            }
        }
    }

    fn next_local_cseq(&self) -> u32 {
        self.0.local_cseq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Builds an in-dialog request addressed at the remote target.
    ///
    /// The caller supplies the branch so that it can outlive the
    /// borrow and be matched against the response later.
    pub fn new_request<'a>(
        &'a self,
        method: SipMethod,
        branch: &'a str,
        sent_by: HostPort,
    ) -> Result<OutgoingRequest<'a>> {
        let uri = match Parser::new(self.0.remote_target.as_bytes()).parse_sip_uri(false)? {
            SipUri::Uri(uri) => uri,
            SipUri::NameAddr(name_addr) => name_addr.uri,
        };
        let local_uri = Parser::new(self.0.local_uri.as_bytes()).parse_sip_uri(false)?;
        let remote_uri = Parser::new(self.0.remote_uri.as_bytes()).parse_sip_uri(false)?;

        let from = headers::From::new(local_uri, &self.0.id.local_tag);
        let mut to = To::new(remote_uri);
        to.set_tag(&self.0.id.remote_tag);

        let headers: Headers = vec![
            Header::Via(Via::new_udp(sent_by, branch)),
            Header::MaxForwards(MaxForwards::new(70)),
            Header::From(from),
            Header::To(to),
            Header::CallId(CallId::new(&self.0.id.call_id)),
            Header::CSeq(CSeq::new(self.next_local_cseq(), method)),
        ]
        .into();

        Ok(OutgoingRequest {
            msg: Request::new_with_headers(method, uri, headers),
            addr: self.0.remote_addr,
            buf: None,
            transport: self.0.transport.clone(),
        })
    }
}

impl fmt::Debug for Dialog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialog")
            .field("id", &self.0.id)
            .field("remote_target", &self.0.remote_target)
            .field("remote_addr", &self.0.remote_addr)
            .finish()
    }
}
