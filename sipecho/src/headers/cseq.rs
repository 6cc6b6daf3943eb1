use core::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::message::SipMethod;
use crate::parser::Parser;

/// The `CSeq` header.
///
/// Orders transactions within a dialog and matches responses
/// to requests.
///
/// # Examples
///
/// ```
/// # use sipecho::{headers::CSeq, message::SipMethod};
/// let cseq = CSeq::new(1, SipMethod::Options);
///
/// assert_eq!("CSeq: 1 OPTIONS", cseq.to_string());
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct CSeq {
    /// The sequence number.
    pub cseq: u32,
    /// The request method.
    pub method: SipMethod,
}

impl CSeq {
    /// Creates a `CSeq` header.
    pub const fn new(cseq: u32, method: SipMethod) -> Self {
        CSeq { cseq, method }
    }
}

impl<'a> SipHeaderParse<'a> for CSeq {
    const NAME: &'static str = "CSeq";

    /*
     * CSeq  =  "CSeq" HCOLON 1*DIGIT LWS Method
     */
    fn parse(parser: &mut Parser<'a>) -> Result<Self> {
        let cseq = parser.parse_u32()?;
        parser.skip_ws();
        let method = SipMethod::from(parser.read_token_bytes());

        Ok(CSeq { cseq, method })
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", CSeq::NAME, self.cseq, self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"4711 INVITE\r\n";
        let mut parser = Parser::new(src);

        let cseq = CSeq::parse(&mut parser).unwrap();

        assert_eq!(cseq.cseq, 4711);
        assert_eq!(cseq.method, SipMethod::Invite);
    }

    #[test]
    fn test_parse_fails_on_missing_number() {
        let src = b"REGISTER\r\n";
        let mut parser = Parser::new(src);

        assert!(CSeq::parse(&mut parser).is_err());
    }
}
