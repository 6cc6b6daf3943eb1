use core::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::parser::Parser;

/// The `Max-Forwards` header.
///
/// Limits the number of proxies or gateways that can forward
/// the request.
///
/// # Examples
///
/// ```
/// # use sipecho::headers::MaxForwards;
/// let max = MaxForwards::new(70);
///
/// assert_eq!("Max-Forwards: 70", max.to_string());
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(transparent)]
pub struct MaxForwards(u32);

impl MaxForwards {
    /// Creates a `Max-Forwards` header with the given hop limit.
    pub const fn new(forwards: u32) -> Self {
        MaxForwards(forwards)
    }

    /// Returns the hop limit.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl<'a> SipHeaderParse<'a> for MaxForwards {
    const NAME: &'static str = "Max-Forwards";

    /*
     * Max-Forwards  =  "Max-Forwards" HCOLON 1*DIGIT
     */
    fn parse(parser: &mut Parser<'a>) -> Result<MaxForwards> {
        let forwards = parser.parse_u32()?;

        Ok(MaxForwards(forwards))
    }
}

impl fmt::Display for MaxForwards {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", MaxForwards::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"6\r\n";
        let mut parser = Parser::new(src);

        let max = MaxForwards::parse(&mut parser).unwrap();

        assert_eq!(max.as_u32(), 6);
    }
}
