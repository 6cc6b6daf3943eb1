#![deny(missing_docs)]
//! SIP Headers types
//!
//! The module provide the [`Headers`] struct that contains
//! an list of [`Header`] and a can be used to manipulating
//! SIP headers.

mod allow;
mod authorization;
mod call_id;
mod contact;
mod content_length;
mod content_type;
mod cseq;
mod expires;
mod from;
mod header;
mod max_forwards;
mod to;
mod user_agent;
mod via;
mod www_authenticate;

pub use allow::Allow;
pub use authorization::Authorization;
pub use call_id::CallId;
pub use contact::Contact;
pub use content_length::ContentLength;
pub use content_type::{ContentType, MediaType, MimeType};
pub use cseq::CSeq;
pub use expires::Expires;
pub use from::From;
pub use header::{Header, OtherHeader};
pub use max_forwards::MaxForwards;
pub use to::To;
pub use user_agent::UserAgent;
pub use via::Via;
pub use www_authenticate::WWWAuthenticate;

use std::fmt;
use std::ops::{Index, Range, RangeFrom};

use crate::error::Result;
use crate::parser::Parser;

pub(crate) const TAG_PARAM: &str = "tag";
pub(crate) const Q_PARAM: &str = "q";
pub(crate) const EXPIRES_PARAM: &str = "expires";

/// A typed header that knows how to parse its own value.
pub trait SipHeaderParse<'a>: Sized {
    /// The header field name.
    const NAME: &'static str;

    /// The compact form of the name, empty when the header has none.
    const SHORT_NAME: &'static str = "";

    /// Returns `true` if `name` identifies this header.
    fn matches_name(name: &str) -> bool {
        name.eq_ignore_ascii_case(Self::NAME)
            || (!Self::SHORT_NAME.is_empty() && name.eq_ignore_ascii_case(Self::SHORT_NAME))
    }

    /// Parses the header value at the parser cursor.
    fn parse(parser: &mut Parser<'a>) -> Result<Self>;

    /// Parses the header value from `src`.
    fn from_bytes(src: &'a [u8]) -> Result<Self> {
        let mut parser = Parser::new(src);

        Self::parse(&mut parser)
    }
}

/// A collection of SIP headers in message order.
///
/// # Examples
///
/// ```
/// # use sipecho::headers::{Header, Headers, Expires};
/// let mut headers = Headers::new();
/// headers.push(Header::Expires(Expires::new(3600)));
///
/// assert_eq!(headers.len(), 1);
/// ```
#[derive(Debug, Default, Clone)]
pub struct Headers<'hdr>(Vec<Header<'hdr>>);

impl<'hdr> Headers<'hdr> {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Headers(Vec::new())
    }

    /// Creates an empty collection with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Headers(Vec::with_capacity(capacity))
    }

    /// Appends a header to the end of the collection.
    pub fn push(&mut self, header: Header<'hdr>) {
        self.0.push(header);
    }

    /// Removes and returns the last header.
    pub fn pop(&mut self) -> Option<Header<'hdr>> {
        self.0.pop()
    }

    /// Moves all headers of `other` into `self`.
    pub fn append(&mut self, other: &mut Headers<'hdr>) {
        self.0.append(&mut other.0);
    }

    /// Returns an iterator over the headers.
    pub fn iter(&self) -> std::slice::Iter<'_, Header<'hdr>> {
        self.0.iter()
    }

    /// Returns a mutable iterator over the headers.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Header<'hdr>> {
        self.0.iter_mut()
    }

    /// Returns the header at `index`.
    pub fn get(&self, index: usize) -> Option<&Header<'hdr>> {
        self.0.get(index)
    }

    /// Returns the number of headers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'hdr> Extend<Header<'hdr>> for Headers<'hdr> {
    fn extend<T: IntoIterator<Item = Header<'hdr>>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl<'hdr> FromIterator<Header<'hdr>> for Headers<'hdr> {
    fn from_iter<T: IntoIterator<Item = Header<'hdr>>>(iter: T) -> Self {
        Headers(iter.into_iter().collect())
    }
}

impl<'hdr, const N: usize> core::convert::From<[Header<'hdr>; N]> for Headers<'hdr> {
    fn from(headers: [Header<'hdr>; N]) -> Self {
        Headers(headers.into())
    }
}

impl<'hdr> core::convert::From<Vec<Header<'hdr>>> for Headers<'hdr> {
    fn from(headers: Vec<Header<'hdr>>) -> Self {
        Headers(headers)
    }
}

impl<'hdr> Index<usize> for Headers<'hdr> {
    type Output = Header<'hdr>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<'hdr> Index<Range<usize>> for Headers<'hdr> {
    type Output = [Header<'hdr>];

    fn index(&self, range: Range<usize>) -> &Self::Output {
        &self.0[range]
    }
}

impl<'hdr> Index<RangeFrom<usize>> for Headers<'hdr> {
    type Output = [Header<'hdr>];

    fn index(&self, range: RangeFrom<usize>) -> &Self::Output {
        &self.0[range]
    }
}

impl fmt::Display for Headers<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for header in self.iter() {
            write!(f, "{}\r\n", header)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::find_map_header;

    #[test]
    fn test_retrieves_header_by_index() {
        let headers = Headers::from([
            Header::Expires(Expires::new(3600)),
            Header::ContentLength(ContentLength::new(0)),
        ]);

        assert_eq!(headers[0], Header::Expires(Expires::new(3600)));
        assert_eq!(headers.get(2), None);
    }

    #[test]
    fn test_push_and_pop() {
        let mut headers = Headers::new();
        headers.push(Header::MaxForwards(MaxForwards::new(70)));

        assert_eq!(headers.pop(), Some(Header::MaxForwards(MaxForwards::new(70))));
        assert!(headers.is_empty());
    }

    #[test]
    fn test_append_moves_all() {
        let mut headers = Headers::from([Header::Expires(Expires::new(60))]);
        let mut other = Headers::from([Header::ContentLength(ContentLength::new(0))]);

        headers.append(&mut other);

        assert_eq!(headers.len(), 2);
        assert!(other.is_empty());
    }

    #[test]
    fn test_find_map_header() {
        let headers = Headers::from([
            Header::MaxForwards(MaxForwards::new(70)),
            Header::Expires(Expires::new(300)),
        ]);

        let expires = find_map_header!(headers, Expires);

        assert_eq!(expires, Some(&Expires::new(300)));
        assert_eq!(find_map_header!(headers, Via), None);
    }

    #[test]
    fn test_display_appends_crlf() {
        let headers = Headers::from([
            Header::Expires(Expires::new(120)),
            Header::ContentLength(ContentLength::new(0)),
        ]);

        assert_eq!(headers.to_string(), "Expires: 120\r\nContent-Length: 0\r\n");
    }
}
