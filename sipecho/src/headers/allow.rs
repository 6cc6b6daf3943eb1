use core::fmt;

use itertools::Itertools;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::macros::hdr_list;
use crate::message::SipMethod;
use crate::parser::Parser;

/// The `Allow` header.
///
/// Lists the methods supported by the user agent.
///
/// # Examples
///
/// ```
/// # use sipecho::headers::Allow;
/// # use sipecho::message::SipMethod;
/// let mut allow = Allow::new();
///
/// allow.push(SipMethod::Invite);
/// allow.push(SipMethod::Register);
///
/// assert_eq!("Allow: INVITE, REGISTER", allow.to_string());
/// ```
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct Allow(Vec<SipMethod>);

impl Allow {
    /// Creates an empty `Allow` header.
    pub const fn new() -> Self {
        Allow(Vec::new())
    }

    /// Appends a method.
    pub fn push(&mut self, method: SipMethod) {
        self.0.push(method);
    }

    /// Gets the method at the specified index.
    pub fn get(&self, index: usize) -> Option<&SipMethod> {
        self.0.get(index)
    }

    /// Returns `true` if the given method is listed.
    pub fn contains(&self, method: SipMethod) -> bool {
        self.0.contains(&method)
    }

    /// Returns the number of methods in the header.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no method is listed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> core::convert::From<[SipMethod; N]> for Allow {
    fn from(methods: [SipMethod; N]) -> Self {
        Allow(methods.into())
    }
}

impl<'a> SipHeaderParse<'a> for Allow {
    const NAME: &'static str = "Allow";

    /*
     * Allow  =  "Allow" HCOLON [Method *(COMMA Method)]
     */
    fn parse(parser: &mut Parser<'a>) -> Result<Self> {
        let allow = hdr_list!(parser => {
            let method = parser.read_token_bytes();

            SipMethod::from(method)
        });

        Ok(Allow(allow))
    }
}

impl fmt::Display for Allow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Allow::NAME, self.0.iter().format(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"INVITE, ACK, OPTIONS, CANCEL, BYE\r\n";
        let mut parser = Parser::new(src);

        let allow = Allow::parse(&mut parser).unwrap();

        assert_eq!(allow.get(0), Some(&SipMethod::Invite));
        assert_eq!(allow.get(1), Some(&SipMethod::Ack));
        assert_eq!(allow.get(2), Some(&SipMethod::Options));
        assert_eq!(allow.get(3), Some(&SipMethod::Cancel));
        assert_eq!(allow.get(4), Some(&SipMethod::Bye));
        assert_eq!(allow.get(5), None);
        assert!(allow.contains(SipMethod::Cancel));
    }
}
