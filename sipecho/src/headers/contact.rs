use core::fmt;

use crate::error::Result;
use crate::headers::{EXPIRES_PARAM, Q_PARAM, SipHeaderParse};
use crate::macros::parse_header_param;
use crate::message::{Params, SipUri};
use crate::parser::Parser;

/// The `Contact` header.
///
/// Carries an address at which the sender can be reached
/// directly.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Contact<'a> {
    /// The `*` form, valid only in a `REGISTER` that removes
    /// all bindings.
    Star,
    /// A contact address.
    Uri {
        /// The contact uri.
        uri: SipUri<'a>,
        /// The `q` parameter.
        q: Option<&'a str>,
        /// The `expires` parameter, in seconds.
        expires: Option<u32>,
        /// Any other parameters.
        params: Option<Params<'a>>,
    },
}

impl<'a> Contact<'a> {
    /// Creates a `Contact` header from an uri.
    pub const fn new(uri: SipUri<'a>) -> Self {
        Contact::Uri {
            uri,
            q: None,
            expires: None,
            params: None,
        }
    }

    /// Returns the contact uri, if this is not the `*` form.
    pub const fn uri(&self) -> Option<&SipUri<'a>> {
        match self {
            Contact::Star => None,
            Contact::Uri { uri, .. } => Some(uri),
        }
    }

    /// Returns the `expires` parameter.
    pub const fn expires(&self) -> Option<u32> {
        match self {
            Contact::Star => None,
            Contact::Uri { expires, .. } => *expires,
        }
    }
}

impl<'a> SipHeaderParse<'a> for Contact<'a> {
    const NAME: &'static str = "Contact";
    const SHORT_NAME: &'static str = "m";

    /*
     * Contact        =  ("Contact" / "m" ) HCOLON
     *                   ( STAR / (contact-param *(COMMA contact-param)))
     * contact-param  =  (name-addr / addr-spec) *(SEMI contact-params)
     * contact-params =  c-p-q / c-p-expires
     *                   / contact-extension
     * c-p-q          =  "q" EQUAL qvalue
     * c-p-expires    =  "expires" EQUAL delta-seconds
     */
    fn parse(parser: &mut Parser<'a>) -> Result<Self> {
        parser.skip_ws();
        if parser.cur_is(b'*') {
            parser.advance();
            return Ok(Contact::Star);
        }
        let uri = parser.parse_sip_uri(false)?;
        let mut q = None;
        let mut expires_value: Option<&str> = None;
        let params = parse_header_param!(parser, Q_PARAM = q, EXPIRES_PARAM = expires_value);
        let expires = expires_value.and_then(|expires| expires.parse().ok());

        Ok(Contact::Uri {
            uri,
            q,
            expires,
            params,
        })
    }
}

impl fmt::Display for Contact<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", Contact::NAME)?;
        match self {
            Contact::Star => write!(f, "*"),
            Contact::Uri {
                uri,
                q,
                expires,
                params,
            } => {
                write!(f, "{}", uri)?;
                if let Some(q) = q {
                    write!(f, ";q={}", q)?;
                }
                if let Some(expires) = expires {
                    write!(f, ";expires={}", expires)?;
                }
                if let Some(params) = params {
                    write!(f, ";{}", params)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"<sip:alice@192.0.2.15:5060>;expires=3600\r\n";
        let mut parser = Parser::new(src);

        let contact = Contact::parse(&mut parser).unwrap();

        assert_eq!(contact.expires(), Some(3600));
        let uri = contact.uri().unwrap().uri();
        assert_eq!(uri.host_port.to_string(), "192.0.2.15:5060");
    }

    #[test]
    fn test_parse_star() {
        let src = b"*\r\n";
        let mut parser = Parser::new(src);

        let contact = Contact::parse(&mut parser).unwrap();

        assert_eq!(contact, Contact::Star);
    }

    #[test]
    fn test_parse_with_q() {
        let src = b"<sips:bob@192.0.2.4>;q=0.7\r\n";
        let mut parser = Parser::new(src);

        let contact = Contact::parse(&mut parser).unwrap();

        assert_eq!(contact.to_string(), "Contact: <sips:bob@192.0.2.4>;q=0.7");
    }
}
