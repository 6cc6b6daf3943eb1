//! SIP message parser.
//!
//! The module provides the [`Parser`] struct for parsing SIP
//! messages, as well as the components they are made of, such
//! as URIs and headers.

use std::str;

use sipecho_util::util::{is_digit, is_newline, is_space, is_valid_port};
use sipecho_util::{Position, Scanner};

use crate::error::{Result, SipParserError};
use crate::headers::*;
use crate::macros::{comma_separated, lookup_table, parse_param};
use crate::message::*;

/// The transport param used in SIP URIs.
const TRANSPORT_PARAM: &str = "transport";
/// The lr param used in SIP URIs.
const LR_PARAM: &str = "lr";
/// The maddr param used in SIP URIs.
const MADDR_PARAM: &str = "maddr";

const REALM: &str = "realm";
const USERNAME: &str = "username";
const NONCE: &str = "nonce";
const DOMAIN: &str = "domain";
const URI: &str = "uri";
const RESPONSE: &str = "response";
const ALGORITHM: &str = "algorithm";
const CNONCE: &str = "cnonce";
const OPAQUE: &str = "opaque";
const QOP: &str = "qop";
const STALE: &str = "stale";
const NC: &str = "nc";

/// Alphanumeric is valid in all sip message components.
const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Unreserved characters in user, password, uri and header
/// parameters in SIP uris.
const UNRESERVED: &[u8] = b"-_.!~*'()%";
/// Escaped character in SIP URIs.
const ESCAPED: &[u8] = b"%";
/// Unreserved characters in the user part of SIP URIs.
const USER_UNRESERVED: &[u8] = b"&=+$,;?/";
/// Token in SIP messages.
const TOKEN: &[u8] = b"-.!%*_`'~+";
/// Password valid characters in SIP URIs.
const PASS: &[u8] = b"&=+$,";
/// Valid characters in the host part of SIP URIs.
const HOST: &[u8] = b"_-.";
/// The "sip" scheme used in SIP URIs.
const SIP: &[u8] = b"sip";
/// The "sips" scheme used in SIP URIs.
const SIPS: &[u8] = b"sips";

// For reading user in uri.
lookup_table!(USER_TAB => ALPHANUMERIC, UNRESERVED, USER_UNRESERVED, ESCAPED);
// For reading password in uri.
lookup_table!(PASS_TAB => ALPHANUMERIC, UNRESERVED, ESCAPED, PASS);
// For reading host in uri.
lookup_table!(HOST_TAB => ALPHANUMERIC, HOST);
// For reading parameter in uri.
lookup_table!(PARAM_TAB => b"[]/:&+$", ALPHANUMERIC, UNRESERVED, ESCAPED);
// For reading header parameter in uri.
lookup_table!(HDR_TAB => b"[]/?:+$", ALPHANUMERIC, UNRESERVED, ESCAPED);
// For reading token.
lookup_table!(TOKEN_TAB => ALPHANUMERIC, TOKEN);
// For reading via parameter.
lookup_table!(VIA_PARAM_TAB => b"[:]", ALPHANUMERIC, TOKEN);

/// A SIP message parser.
///
/// Parses a complete message with [`Parser::parse_sip_msg`], or
/// individual components through the
/// [`SipHeaderParse`](crate::headers::SipHeaderParse)
/// implementations.
///
/// The parser borrows the input buffer, so every parsed message
/// references the bytes it was read from.
pub struct Parser<'buf> {
    scanner: Scanner<'buf>,
}

impl<'buf> Parser<'buf> {
    /// Creates a new `Parser` over the given input.
    #[inline]
    pub fn new<B>(buf: &'buf B) -> Self
    where
        B: AsRef<[u8]> + ?Sized,
    {
        Parser {
            scanner: Scanner::new(buf.as_ref()),
        }
    }

    /// Parses the input into a [`SipMsg`].
    ///
    /// # Examples
    ///
    /// ```
    /// # use sipecho::parser::Parser;
    /// let buf = "SIP/2.0 200 OK\r\nContent-Length: 0\r\n\r\n";
    /// let msg = Parser::new(buf).parse_sip_msg().unwrap();
    /// let res = msg.response().unwrap();
    ///
    /// assert_eq!(res.code().as_u16(), 200);
    /// assert_eq!(res.reason(), "OK");
    /// ```
    pub fn parse_sip_msg(&mut self) -> Result<SipMsg<'buf>> {
        let mut msg = self.parse_start_line()?;

        let headers = msg.headers_mut();
        'headers: loop {
            let name = self.parse_token()?;
            self.skip_ws();
            self.must_read(b':')?;
            self.skip_ws();

            match name {
                name if Via::matches_name(name) => comma_separated!(self => {
                    headers.push(Header::Via(Via::parse(self)?));
                }),
                name if From::matches_name(name) => {
                    headers.push(Header::From(From::parse(self)?));
                }
                name if To::matches_name(name) => {
                    headers.push(Header::To(To::parse(self)?));
                }
                name if CallId::matches_name(name) => {
                    headers.push(Header::CallId(CallId::parse(self)?));
                }
                name if CSeq::matches_name(name) => {
                    headers.push(Header::CSeq(CSeq::parse(self)?));
                }
                name if MaxForwards::matches_name(name) => {
                    headers.push(Header::MaxForwards(MaxForwards::parse(self)?));
                }
                name if Contact::matches_name(name) => comma_separated!(self => {
                    headers.push(Header::Contact(Contact::parse(self)?));
                }),
                name if Expires::matches_name(name) => {
                    headers.push(Header::Expires(Expires::parse(self)?));
                }
                name if ContentLength::matches_name(name) => {
                    headers.push(Header::ContentLength(ContentLength::parse(self)?));
                }
                name if ContentType::matches_name(name) => {
                    headers.push(Header::ContentType(ContentType::parse(self)?));
                }
                name if Allow::matches_name(name) => {
                    headers.push(Header::Allow(Allow::parse(self)?));
                }
                name if UserAgent::matches_name(name) => {
                    headers.push(Header::UserAgent(UserAgent::parse(self)?));
                }
                name if WWWAuthenticate::matches_name(name) => {
                    headers.push(Header::WWWAuthenticate(WWWAuthenticate::parse(self)?));
                }
                name if Authorization::matches_name(name) => {
                    headers.push(Header::Authorization(Authorization::parse(self)?));
                }
                name => {
                    // A header this crate has no typed representation
                    // for. Kept verbatim.
                    let value = self.parse_header_value()?;
                    headers.push(Header::Other(OtherHeader { name, value }));
                }
            }

            if !self.scanner.consume_if(|b| b == b'\r') || !self.scanner.consume_if(|b| b == b'\n')
            {
                return self.parse_error("missing CRLF at header end");
            }

            if matches!(self.peek(), Some(b'\r') | Some(b'\n') | None) {
                break 'headers;
            }
        }

        // The empty line separating headers from the body.
        self.skip_newline();

        let body = self.scanner.remaining();
        if !body.is_empty() {
            msg.set_body(Some(body));
        }

        Ok(msg)
    }

    fn parse_start_line(&mut self) -> Result<SipMsg<'buf>> {
        // Might be enough for most messages.
        let probable_number_of_headers = 10;
        let headers = Headers::with_capacity(probable_number_of_headers);

        if self.scanner.starts_with(SIPV2.as_bytes()) {
            // Is a status line, e.g, "SIP/2.0 200 OK".
            let status_line = self.parse_status_line()?;

            Ok(SipMsg::Response(Response {
                status_line,
                headers,
                body: None,
            }))
        } else {
            // Is a request line, e.g, "OPTIONS sip:localhost SIP/2.0".
            let req_line = self.parse_request_line()?;

            Ok(SipMsg::Request(Request {
                req_line,
                headers,
                body: None,
            }))
        }
    }

    fn parse_status_line(&mut self) -> Result<StatusLine<'buf>> {
        self.parse_sip_version()?;
        self.skip_ws();
        let code = self.parse_status_code()?;
        self.skip_ws();
        let reason = self.read_until_newline()?;
        self.skip_newline();

        Ok(StatusLine { code, reason })
    }

    fn parse_request_line(&mut self) -> Result<RequestLine<'buf>> {
        let method = SipMethod::from(self.read_token_bytes());
        self.skip_ws();
        let uri = self.parse_uri(true)?;
        self.skip_ws();
        self.parse_sip_version()?;
        self.skip_newline();

        Ok(RequestLine { method, uri })
    }

    fn parse_status_code(&mut self) -> Result<StatusCode> {
        let digits = self.scanner.read_while(is_digit);

        match digits.try_into() {
            Ok(code) => Ok(code),
            Err(_) => self.parse_error("invalid status code"),
        }
    }

    #[inline]
    pub(crate) fn parse_sip_version(&mut self) -> Result<()> {
        if !self.scanner.starts_with(SIPV2.as_bytes()) {
            return self.parse_error("expected SIP/2.0");
        }
        self.scanner.bump_n(SIPV2.len());

        Ok(())
    }

    pub(crate) fn parse_scheme(&mut self) -> Result<Scheme> {
        let (token, _) = self.scanner.peek_while(is_token);

        let scheme = match token {
            SIP => Scheme::Sip,
            SIPS => Scheme::Sips,
            _ => return self.parse_error("unsupported URI scheme"),
        };

        self.scanner.bump_n(token.len());
        self.must_read(b':')?;

        Ok(scheme)
    }

    /// Parses an addr-spec or a name-addr into a [`SipUri`].
    ///
    /// `parse_params` controls whether parameters following an
    /// addr-spec belong to the uri. Parameters after a name-addr
    /// always stay outside the enclosing brackets.
    pub(crate) fn parse_sip_uri(&mut self, parse_params: bool) -> Result<SipUri<'buf>> {
        self.skip_ws();

        match self.scanner.peek_n(3) {
            Some(SIP) => Ok(SipUri::Uri(self.parse_uri(parse_params)?)),
            _ => Ok(SipUri::NameAddr(self.parse_name_addr()?)),
        }
    }

    // "sip:" [ userinfo ] hostport uri-parameters [ headers ]
    pub(crate) fn parse_uri(&mut self, parse_params: bool) -> Result<Uri<'buf>> {
        self.skip_ws();
        let scheme = self.parse_scheme()?;
        let user = self.parse_uri_user()?;
        let host_port = self.parse_host_port()?;

        if !parse_params {
            return Ok(Uri {
                scheme,
                user,
                host_port,
                transport_param: None,
                lr_param: false,
                maddr_param: None,
                params: None,
                hdr_params: None,
            });
        }

        let mut transport_value = None;
        let mut lr_value: Option<&str> = None;
        let mut maddr_value = None;
        let params = parse_param!(
            self,
            Parser::parse_uri_param,
            TRANSPORT_PARAM = transport_value,
            LR_PARAM = lr_value,
            MADDR_PARAM = maddr_value
        );

        let transport_param = transport_value.map(TransportProtocol::from);
        let lr_param = lr_value.is_some();
        let maddr_param = maddr_value.map(Host::from);

        let hdr_params = if self.cur_is(b'?') {
            self.advance();
            Some(self.parse_uri_headers()?)
        } else {
            None
        };

        Ok(Uri {
            scheme,
            user,
            host_port,
            transport_param,
            lr_param,
            maddr_param,
            params,
            hdr_params,
        })
    }

    pub(crate) fn parse_name_addr(&mut self) -> Result<NameAddr<'buf>> {
        self.skip_ws();
        let display = self.parse_display_name()?;
        self.skip_ws();
        self.must_read(b'<')?;
        let uri = self.parse_uri(true)?;
        self.must_read(b'>')?;

        Ok(NameAddr { display, uri })
    }

    fn parse_display_name(&mut self) -> Result<Option<&'buf str>> {
        match self.peek() {
            Some(b'"') => {
                self.advance();
                let name = self.read_str_while(|b| b != b'"')?;
                self.must_read(b'"')?;

                Ok(Some(name))
            }
            Some(b'<') => Ok(None),
            None => self.parse_error("unexpected end of input"),
            _ => {
                let name = self.parse_token()?;
                self.skip_ws();

                Ok(Some(name))
            }
        }
    }

    fn parse_uri_user(&mut self) -> Result<Option<UriUser<'buf>>> {
        if !self.has_user_part() {
            return Ok(None);
        }

        let user = self.read_str_while(is_user)?;
        let pass = if self.scanner.consume_if(|b| b == b':') {
            Some(self.read_str_while(is_pass)?)
        } else {
            None
        };
        self.must_read(b'@')?;

        Ok(Some(UriUser { user, pass }))
    }

    fn has_user_part(&self) -> bool {
        self.scanner
            .remaining()
            .iter()
            .take_while(|&&b| !is_space(b) && !is_newline(b) && b != b'>')
            .any(|&b| b == b'@')
    }

    pub(crate) fn parse_host_port(&mut self) -> Result<HostPort> {
        let host = match self.peek() {
            Some(b'[') => {
                // Is an IPv6 host. The '[' and ']' characters are
                // not part of the address.
                self.advance();
                let host = self.read_str_while(|b| b != b']')?;
                self.must_read(b']')?;

                match host.parse() {
                    Ok(addr) => Host::IpAddr(addr),
                    Err(_) => return self.parse_error("invalid IPv6 host"),
                }
            }
            _ => {
                // Is a domain name or an IPv4 host.
                let host = self.read_str_while(is_host)?;
                if host.is_empty() {
                    return self.parse_error("missing host");
                }

                match host.parse() {
                    Ok(addr) => Host::IpAddr(addr),
                    Err(_) => Host::DomainName(host.into()),
                }
            }
        };
        let port = self.parse_port()?;

        Ok(HostPort { host, port })
    }

    fn parse_port(&mut self) -> Result<Option<u16>> {
        if !self.scanner.consume_if(|b| b == b':') {
            return Ok(None);
        }

        let port = self.parse_u16()?;
        if is_valid_port(port) {
            Ok(Some(port))
        } else {
            self.parse_error("invalid port")
        }
    }

    fn parse_uri_headers(&mut self) -> Result<Params<'buf>> {
        let mut params = Params::new();

        loop {
            let param = self.parse_param_with(is_hdr_uri)?;
            params.push(param);

            if !self.scanner.consume_if(|b| b == b'&') {
                break;
            }
        }

        Ok(params)
    }

    /// Parses a generic `pname [ "=" pvalue ]` parameter.
    pub(crate) fn parse_param(&mut self) -> Result<Param<'buf>> {
        self.parse_param_with(is_token)
    }

    /// Parses a `Via` header parameter, whose values may carry
    /// IPv6 literals.
    pub(crate) fn parse_via_param(&mut self) -> Result<Param<'buf>> {
        self.parse_param_with(is_via_param)
    }

    fn parse_uri_param(&mut self) -> Result<Param<'buf>> {
        let mut param = self.parse_param_with(is_param)?;

        // The lr parameter has no value, but its presence must
        // survive the named-parameter match.
        if param.name.eq_ignore_ascii_case(LR_PARAM) && param.value.is_none() {
            param.value = Some("");
        }

        Ok(param)
    }

    fn parse_param_with(&mut self, func: impl Fn(u8) -> bool) -> Result<Param<'buf>> {
        self.skip_ws();
        let name = self.read_str_while(&func)?;

        let Some(b'=') = self.peek() else {
            return Ok(Param { name, value: None });
        };
        self.advance();

        let value = if let Some(b'"') = self.peek() {
            self.parse_quoted()?
        } else {
            self.read_str_while(&func)?
        };

        Ok(Param {
            name,
            value: Some(value),
        })
    }

    /// Parses a quoted string, returning its content without the
    /// surrounding quotes.
    pub(crate) fn parse_quoted(&mut self) -> Result<&'buf str> {
        self.must_read(b'"')?;
        let value = self.read_str_while(|b| b != b'"')?;
        self.must_read(b'"')?;

        Ok(value)
    }

    pub(crate) fn parse_auth_credential(&mut self) -> Result<Credential<'buf>> {
        let scheme = self.parse_token()?;

        if scheme == DIGEST_SCHEME {
            return Ok(Credential::Digest(self.parse_digest_credential()?));
        }

        let mut param = Params::new();
        comma_separated!(self => {
            param.push(self.parse_param()?);
        });

        Ok(Credential::Other { scheme, param })
    }

    pub(crate) fn parse_auth_challenge(&mut self) -> Result<Challenge<'buf>> {
        let scheme = self.parse_token()?;

        if scheme == DIGEST_SCHEME {
            return Ok(Challenge::Digest(self.parse_digest_challenge()?));
        }

        let mut param = Params::new();
        comma_separated!(self => {
            param.push(self.parse_param()?);
        });

        Ok(Challenge::Other { scheme, param })
    }

    fn parse_digest_challenge(&mut self) -> Result<DigestChallenge<'buf>> {
        let mut digest = DigestChallenge::default();

        comma_separated!(self => {
            let Param { name, value } = self.parse_param()?;

            match name {
                REALM => digest.realm = value,
                NONCE => digest.nonce = value,
                DOMAIN => digest.domain = value,
                ALGORITHM => digest.algorithm = value,
                OPAQUE => digest.opaque = value,
                QOP => digest.qop = value,
                STALE => digest.stale = value,
                _ => (),
            }
        });

        Ok(digest)
    }

    fn parse_digest_credential(&mut self) -> Result<DigestCredential<'buf>> {
        let mut digest = DigestCredential::default();

        comma_separated!(self => {
            let Param { name, value } = self.parse_param()?;

            match name {
                REALM => digest.realm = value,
                USERNAME => digest.username = value,
                NONCE => digest.nonce = value,
                URI => digest.uri = value,
                RESPONSE => digest.response = value,
                ALGORITHM => digest.algorithm = value,
                CNONCE => digest.cnonce = value,
                OPAQUE => digest.opaque = value,
                QOP => digest.qop = value,
                NC => digest.nc = value,
                _ => (),
            }
        });

        Ok(digest)
    }

    /// Parses a token, or a quoted string if the input starts
    /// with a quote.
    #[inline]
    pub(crate) fn parse_token(&mut self) -> Result<&'buf str> {
        if let Some(b'"') = self.peek() {
            self.parse_quoted()
        } else {
            self.read_str_while(is_token)
        }
    }

    /// Reads the rest of the header line, with trailing
    /// whitespace removed.
    pub(crate) fn parse_header_value(&mut self) -> Result<&'buf str> {
        let value = self.read_until_newline()?;

        Ok(value.trim_end())
    }

    fn read_until_newline(&mut self) -> Result<&'buf str> {
        let bytes = self.scanner.read_while(|b| !is_newline(b));

        Ok(str::from_utf8(bytes)?)
    }

    #[inline]
    pub(crate) fn read_transport(&mut self) -> TransportProtocol {
        TransportProtocol::from(self.read_token_bytes())
    }

    #[inline]
    pub(crate) fn read_token_bytes(&mut self) -> &'buf [u8] {
        self.scanner.read_while(is_token)
    }

    fn read_str_while(&mut self, func: impl Fn(u8) -> bool) -> Result<&'buf str> {
        Ok(str::from_utf8(self.scanner.read_while(func))?)
    }

    #[inline]
    pub(crate) fn skip_ws(&mut self) {
        self.scanner.read_while(is_space);
    }

    #[inline]
    pub(crate) fn skip_newline(&mut self) {
        self.scanner.read_while(is_newline);
    }

    #[inline]
    pub(crate) fn peek(&self) -> Option<u8> {
        self.scanner.peek()
    }

    #[inline]
    pub(crate) fn cur_is(&self, byte: u8) -> bool {
        self.scanner.cur_is_some_and(|b| b == byte)
    }

    #[inline]
    pub(crate) fn advance(&mut self) {
        self.scanner.bump_n(1);
    }

    #[inline]
    pub(crate) fn must_read(&mut self, byte: u8) -> Result<()> {
        Ok(self.scanner.must_read(byte)?)
    }

    #[inline]
    pub(crate) fn parse_u32(&mut self) -> Result<u32> {
        Ok(self.scanner.read_u32()?)
    }

    #[inline]
    pub(crate) fn parse_u16(&mut self) -> Result<u16> {
        Ok(self.scanner.read_u16()?)
    }

    /// Shortcut for yielding a parse error wrapped in a result.
    pub(crate) fn parse_error<T>(&self, message: &str) -> Result<T> {
        let Position { line, col } = self.scanner.position();

        Err(SipParserError::new(format!("{message} at line:{line} column:{col}")).into())
    }
}

#[inline(always)]
fn is_via_param(b: u8) -> bool {
    VIA_PARAM_TAB[b as usize]
}

#[inline(always)]
fn is_host(b: u8) -> bool {
    HOST_TAB[b as usize]
}

#[inline(always)]
fn is_token(b: u8) -> bool {
    TOKEN_TAB[b as usize]
}

#[inline(always)]
fn is_user(b: u8) -> bool {
    USER_TAB[b as usize]
}

#[inline(always)]
fn is_pass(b: u8) -> bool {
    PASS_TAB[b as usize]
}

#[inline(always)]
fn is_param(b: u8) -> bool {
    PARAM_TAB[b as usize]
}

#[inline(always)]
fn is_hdr_uri(b: u8) -> bool {
    HDR_TAB[b as usize]
}
