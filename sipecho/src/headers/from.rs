use core::fmt;

use crate::error::Result;
use crate::headers::{SipHeaderParse, TAG_PARAM};
use crate::macros::parse_header_param;
use crate::message::{Params, SipUri};
use crate::parser::Parser;

/// The `From` header.
///
/// Indicates the initiator of the request.
///
/// # Examples
///
/// ```
/// # use sipecho::headers::From;
/// # use sipecho::message::{NameAddr, SipUri, UriBuilder};
/// let uri = SipUri::NameAddr(NameAddr {
///     display: None,
///     uri: UriBuilder::new()
///         .user("alice")
///         .host_port("client.atlanta.example.com".parse().unwrap())
///         .get(),
/// });
/// let from = From { uri, tag: Some("9fxced76sl"), params: None };
///
/// assert_eq!(
///     from.to_string(),
///     "From: <sip:alice@client.atlanta.example.com>;tag=9fxced76sl"
/// );
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct From<'a> {
    /// The uri of the `From` header.
    pub uri: SipUri<'a>,
    /// The tag parameter.
    pub tag: Option<&'a str>,
    /// Any other parameters.
    pub params: Option<Params<'a>>,
}

impl<'a> From<'a> {
    /// Creates a `From` header from an uri and a tag.
    pub const fn new(uri: SipUri<'a>, tag: &'a str) -> Self {
        From {
            uri,
            tag: Some(tag),
            params: None,
        }
    }
}

impl<'a> SipHeaderParse<'a> for From<'a> {
    const NAME: &'static str = "From";
    const SHORT_NAME: &'static str = "f";

    /*
     * From       =  ( "From" / "f" ) HCOLON from-spec
     * from-spec  =  ( name-addr / addr-spec )
     *               *( SEMI from-param )
     * from-param  =  tag-param / generic-param
     * tag-param   =  "tag" EQUAL token
     */
    fn parse(parser: &mut Parser<'a>) -> Result<Self> {
        let uri = parser.parse_sip_uri(false)?;
        let mut tag = None;
        let params = parse_header_param!(parser, TAG_PARAM = tag);

        Ok(From { uri, tag, params })
    }
}

impl fmt::Display for From<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", From::NAME, self.uri)?;

        if let Some(tag) = self.tag {
            write!(f, ";tag={}", tag)?;
        }
        if let Some(params) = &self.params {
            write!(f, ";{}", params)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"<sip:bob@biloxi.example.com>;tag=a6c85cf\r\n";
        let mut parser = Parser::new(src);

        let from = From::parse(&mut parser).unwrap();

        assert_eq!(from.tag, Some("a6c85cf"));
        let uri = from.uri.uri();
        assert_eq!(uri.user.as_ref().unwrap().user, "bob");
        assert_eq!(uri.host_port.to_string(), "biloxi.example.com");
    }

    #[test]
    fn test_parse_with_display_name() {
        let src = b"\"Alice\" <sip:alice@atlanta.example.com>;tag=9fxced76sl\r\n";
        let mut parser = Parser::new(src);

        let from = From::parse(&mut parser).unwrap();

        assert_eq!(from.tag, Some("9fxced76sl"));
        assert!(matches!(from.uri, SipUri::NameAddr(_)));
    }

    #[test]
    fn test_parse_without_tag() {
        let src = b"sip:carol@chicago.example.com\r\n";
        let mut parser = Parser::new(src);

        let from = From::parse(&mut parser).unwrap();

        assert_eq!(from.tag, None);
        assert!(matches!(from.uri, SipUri::Uri(_)));
    }
}
