use core::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::parser::Parser;

/// The `Content-Length` header.
///
/// Indicates the size, in bytes, of the message body.
///
/// # Examples
///
/// ```
/// # use sipecho::headers::ContentLength;
/// let c_len = ContentLength::new(349);
///
/// assert_eq!("Content-Length: 349", c_len.to_string());
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(transparent)]
pub struct ContentLength(u32);

impl ContentLength {
    /// Creates a `Content-Length` header.
    pub const fn new(length: u32) -> Self {
        ContentLength(length)
    }

    /// Returns the body length in bytes.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl<'a> SipHeaderParse<'a> for ContentLength {
    const NAME: &'static str = "Content-Length";
    const SHORT_NAME: &'static str = "l";

    /*
     * Content-Length  =  ( "Content-Length" / "l" ) HCOLON 1*DIGIT
     */
    fn parse(parser: &mut Parser<'a>) -> Result<ContentLength> {
        let length = parser.parse_u32()?;

        Ok(ContentLength(length))
    }
}

impl fmt::Display for ContentLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", ContentLength::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"349\r\n";
        let mut parser = Parser::new(src);

        let c_len = ContentLength::parse(&mut parser).unwrap();

        assert_eq!(c_len.as_u32(), 349);
    }
}
