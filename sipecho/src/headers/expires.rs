use core::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::parser::Parser;

/// The `Expires` header.
///
/// Gives the relative time after which the message (or
/// content) expires.
///
/// # Examples
///
/// ```
/// # use sipecho::headers::Expires;
/// let expires = Expires::new(3600);
///
/// assert_eq!("Expires: 3600", expires.to_string());
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(transparent)]
pub struct Expires(u32);

impl Expires {
    /// Creates an `Expires` header with the given expiration time.
    pub const fn new(expires: u32) -> Self {
        Expires(expires)
    }

    /// Returns the expiration time in seconds.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl<'a> SipHeaderParse<'a> for Expires {
    const NAME: &'static str = "Expires";

    /*
     * Expires  =  "Expires" HCOLON delta-seconds
     */
    fn parse(parser: &mut Parser<'a>) -> Result<Expires> {
        let expires = parser.parse_u32()?;

        Ok(Expires(expires))
    }
}

impl fmt::Display for Expires {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Expires::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"5\r\n";
        let mut parser = Parser::new(src);

        let expires = Expires::parse(&mut parser).unwrap();

        assert_eq!(expires.as_u32(), 5);
    }
}
