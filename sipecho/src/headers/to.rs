use core::fmt;

use crate::error::Result;
use crate::headers::{SipHeaderParse, TAG_PARAM};
use crate::macros::parse_header_param;
use crate::message::{Params, SipUri};
use crate::parser::Parser;

/// The `To` header.
///
/// Specifies the logical recipient of the request.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct To<'a> {
    /// The uri of the `To` header.
    pub uri: SipUri<'a>,
    /// The tag parameter.
    pub tag: Option<&'a str>,
    /// Any other parameters.
    pub params: Option<Params<'a>>,
}

impl<'a> To<'a> {
    /// Creates a `To` header without a tag.
    pub const fn new(uri: SipUri<'a>) -> Self {
        To {
            uri,
            tag: None,
            params: None,
        }
    }

    /// Sets the tag parameter.
    pub const fn set_tag(&mut self, tag: &'a str) {
        self.tag = Some(tag);
    }
}

impl<'a> SipHeaderParse<'a> for To<'a> {
    const NAME: &'static str = "To";
    const SHORT_NAME: &'static str = "t";

    /*
     * To        =  ( "To" / "t" ) HCOLON ( name-addr
     *              / addr-spec ) *( SEMI to-param )
     * to-param  =  tag-param / generic-param
     */
    fn parse(parser: &mut Parser<'a>) -> Result<Self> {
        let uri = parser.parse_sip_uri(false)?;
        let mut tag = None;
        let params = parse_header_param!(parser, TAG_PARAM = tag);

        Ok(To { uri, tag, params })
    }
}

impl fmt::Display for To<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", To::NAME, self.uri)?;

        if let Some(tag) = self.tag {
            write!(f, ";tag={}", tag)?;
        }
        if let Some(params) = &self.params {
            write!(f, ";{}", params)?;
        }

        Ok(())
    }
}
