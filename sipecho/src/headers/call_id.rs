use core::fmt;

use super::SipHeaderParse;
use crate::error::Result;
use crate::parser::Parser;

/// The `Call-ID` header.
///
/// Uniquely identifies a particular invitation or all
/// registrations of a particular client.
///
/// # Examples
///
/// ```
/// # use sipecho::headers::CallId;
/// let cid = CallId::new("bs9ki9iqbee8k5kal8mpqb");
///
/// assert_eq!("Call-ID: bs9ki9iqbee8k5kal8mpqb", cid.to_string());
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Hash, Copy)]
#[repr(transparent)]
pub struct CallId<'a>(&'a str);

impl<'a> CallId<'a> {
    /// Creates a `Call-ID` header from the given id.
    pub const fn new(id: &'a str) -> Self {
        CallId(id)
    }

    /// Returns the id.
    pub const fn as_str(&self) -> &'a str {
        self.0
    }
}

impl<'a> core::convert::From<&'a str> for CallId<'a> {
    fn from(id: &'a str) -> Self {
        CallId(id)
    }
}

impl<'a> SipHeaderParse<'a> for CallId<'a> {
    const NAME: &'static str = "Call-ID";
    const SHORT_NAME: &'static str = "i";

    /*
     * Call-ID  =  ( "Call-ID" / "i" ) HCOLON callid
     * callid   =  word [ "@" word ]
     */
    fn parse(parser: &mut Parser<'a>) -> Result<Self> {
        let id = parser.parse_header_value()?;

        Ok(CallId(id))
    }
}

impl fmt::Display for CallId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", CallId::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"843817637684230@998sdasdh09\r\n";
        let mut parser = Parser::new(src);

        let cid = CallId::parse(&mut parser).unwrap();

        assert_eq!(cid.as_str(), "843817637684230@998sdasdh09");
    }
}
