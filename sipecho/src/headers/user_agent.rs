use core::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::parser::Parser;

/// The `User-Agent` header.
///
/// Contains information about the client originating the
/// request.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct UserAgent<'a>(&'a str);

impl<'a> UserAgent<'a> {
    /// Creates an `User-Agent` header.
    pub const fn new(agent: &'a str) -> Self {
        UserAgent(agent)
    }

    /// Returns the agent string.
    pub const fn as_str(&self) -> &'a str {
        self.0
    }
}

impl<'a> SipHeaderParse<'a> for UserAgent<'a> {
    const NAME: &'static str = "User-Agent";

    /*
     * User-Agent  =  "User-Agent" HCOLON server-val *(LWS server-val)
     */
    fn parse(parser: &mut Parser<'a>) -> Result<Self> {
        let agent = parser.parse_header_value()?;

        Ok(UserAgent(agent))
    }
}

impl fmt::Display for UserAgent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", UserAgent::NAME, self.0)
    }
}
