#![deny(missing_docs)]
//! SIP Message types
//!
//! The module provide the [`SipMsg`] enum that can be an [`SipMsg::Request`] or
//! [`SipMsg::Response`] and represents a SIP message.

use std::fmt;

use crate::headers::Headers;

pub mod auth;

mod code;
mod method;
mod params;
mod protocol;
mod uri;

pub use auth::*;
pub use code::*;
pub use method::*;
pub use params::*;
pub use protocol::*;
pub use uri::*;

/// The SIP protocol version written on every start line.
pub(crate) const SIPV2: &str = "SIP/2.0";

/// An SIP message, either Request or Response.
///
/// # Examples
///
/// ```
/// # use sipecho::message::{Request, SipMethod, SipMsg, Uri};
/// let request = Request::new(SipMethod::Options, Uri::default().into());
/// let msg = SipMsg::from(request);
///
/// assert!(msg.is_request());
/// ```
#[derive(Debug)]
pub enum SipMsg<'m> {
    /// A request message.
    Request(Request<'m>),
    /// A response message.
    Response(Response<'m>),
}

impl<'m> SipMsg<'m> {
    /// Returns `true` if the message is a request.
    pub const fn is_request(&self) -> bool {
        matches!(self, SipMsg::Request(_))
    }

    /// Returns `true` if the message is a response.
    pub const fn is_response(&self) -> bool {
        matches!(self, SipMsg::Response(_))
    }

    /// Returns the request, if the message is one.
    pub const fn request(&self) -> Option<&Request<'m>> {
        match self {
            SipMsg::Request(request) => Some(request),
            SipMsg::Response(_) => None,
        }
    }

    /// Returns the response, if the message is one.
    pub const fn response(&self) -> Option<&Response<'m>> {
        match self {
            SipMsg::Request(_) => None,
            SipMsg::Response(response) => Some(response),
        }
    }

    /// Returns the headers of the message.
    pub const fn headers(&self) -> &Headers<'m> {
        match self {
            SipMsg::Request(request) => &request.headers,
            SipMsg::Response(response) => &response.headers,
        }
    }

    /// Returns the headers of the message.
    pub const fn headers_mut(&mut self) -> &mut Headers<'m> {
        match self {
            SipMsg::Request(request) => &mut request.headers,
            SipMsg::Response(response) => &mut response.headers,
        }
    }

    /// Returns the body of the message.
    pub const fn body(&self) -> Option<&'m [u8]> {
        match self {
            SipMsg::Request(request) => request.body,
            SipMsg::Response(response) => response.body,
        }
    }

    /// Sets the body of the message.
    pub const fn set_body(&mut self, body: Option<&'m [u8]>) {
        match self {
            SipMsg::Request(request) => request.body = body,
            SipMsg::Response(response) => response.body = body,
        }
    }
}

impl<'m> From<Request<'m>> for SipMsg<'m> {
    fn from(request: Request<'m>) -> Self {
        SipMsg::Request(request)
    }
}

impl<'m> From<Response<'m>> for SipMsg<'m> {
    fn from(response: Response<'m>) -> Self {
        SipMsg::Response(response)
    }
}

/// The first line of a request.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RequestLine<'a> {
    /// The request method.
    pub method: SipMethod,
    /// The Request-URI.
    pub uri: Uri<'a>,
}

impl fmt::Display for RequestLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n", self.method, self.uri, SIPV2)
    }
}

/// A SIP request.
#[derive(Debug)]
pub struct Request<'r> {
    /// The request line.
    pub req_line: RequestLine<'r>,
    /// The headers of the request.
    pub headers: Headers<'r>,
    /// The body of the request, if any.
    pub body: Option<&'r [u8]>,
}

impl<'r> Request<'r> {
    /// Creates a request with no headers and no body.
    pub fn new(method: SipMethod, uri: Uri<'r>) -> Self {
        Request {
            req_line: RequestLine { method, uri },
            headers: Headers::new(),
            body: None,
        }
    }

    /// Creates a request with the given headers.
    pub fn new_with_headers(method: SipMethod, uri: Uri<'r>, headers: Headers<'r>) -> Self {
        Request {
            req_line: RequestLine { method, uri },
            headers,
            body: None,
        }
    }

    /// Returns the method of the request.
    pub const fn method(&self) -> SipMethod {
        self.req_line.method
    }
}

/// The first line of a response.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StatusLine<'a> {
    /// The status code.
    pub code: StatusCode,
    /// The reason phrase.
    pub reason: &'a str,
}

impl fmt::Display for StatusLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n", SIPV2, self.code, self.reason)
    }
}

/// A SIP response.
#[derive(Debug)]
pub struct Response<'a> {
    /// The status line.
    pub status_line: StatusLine<'a>,
    /// The headers of the response.
    pub headers: Headers<'a>,
    /// The body of the response, if any.
    pub body: Option<&'a [u8]>,
}

impl<'a> Response<'a> {
    /// Creates a response with the default reason phrase for `code`.
    pub fn new(code: StatusCode) -> Self {
        Response {
            status_line: StatusLine {
                code,
                reason: code.reason(),
            },
            headers: Headers::new(),
            body: None,
        }
    }

    /// Creates a response with the given headers.
    pub fn new_with_headers(code: StatusCode, headers: Headers<'a>) -> Self {
        Response {
            status_line: StatusLine {
                code,
                reason: code.reason(),
            },
            headers,
            body: None,
        }
    }

    /// Returns the status code.
    pub const fn code(&self) -> StatusCode {
        self.status_line.code
    }

    /// Returns the reason phrase.
    pub const fn reason(&self) -> &'a str {
        self.status_line.reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_line_display() {
        let uri = Uri::builder()
            .user("bob")
            .host_port("biloxi.example.com".parse().unwrap())
            .get();
        let req_line = RequestLine {
            method: SipMethod::Invite,
            uri,
        };

        assert_eq!(req_line.to_string(), "INVITE sip:bob@biloxi.example.com SIP/2.0\r\n");
    }

    #[test]
    fn test_status_line_display() {
        let response = Response::new(StatusCode::Ringing);

        assert_eq!(response.status_line.to_string(), "SIP/2.0 180 Ringing\r\n");
    }
}
