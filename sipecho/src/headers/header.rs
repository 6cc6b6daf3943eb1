use enum_as_inner::EnumAsInner;
use std::fmt;

use crate::headers::*;

/// A SIP Header.
///
/// This enum contain the SIP headers, as defined in `RFC3261`, see their
/// respective documentation for more details.
#[derive(Debug, PartialEq, Eq, EnumAsInner, Clone)]
pub enum Header<'a> {
    /// `Via` Header
    Via(Via<'a>),
    /// `From` Header
    From(From<'a>),
    /// `To` Header
    To(To<'a>),
    /// `Contact` Header
    Contact(Contact<'a>),
    /// `Call-ID` Header
    CallId(CallId<'a>),
    /// `CSeq` Header
    CSeq(CSeq),
    /// `Max-Forwards` Header
    MaxForwards(MaxForwards),
    /// `Expires` Header
    Expires(Expires),
    /// `Content-Length` Header
    ContentLength(ContentLength),
    /// `Content-Type` Header
    ContentType(ContentType<'a>),
    /// `Allow` Header
    Allow(Allow),
    /// `User-Agent` Header
    UserAgent(UserAgent<'a>),
    /// `WWW-Authenticate` Header
    WWWAuthenticate(WWWAuthenticate<'a>),
    /// `Authorization` Header
    Authorization(Authorization<'a>),
    /// A header not otherwise typed.
    Other(OtherHeader<'a>),
}

/// A header that the parser does not know, kept as raw name and
/// value.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct OtherHeader<'a> {
    /// The header name.
    pub name: &'a str,
    /// The raw header value.
    pub value: &'a str,
}

impl fmt::Display for OtherHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

macro_rules! impl_header_display {
    ($($variant:ident),*) => {
        impl fmt::Display for Header<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Header::$variant(header) => write!(f, "{}", header),)*
                }
            }
        }
    };
}

impl_header_display!(
    Via,
    From,
    To,
    Contact,
    CallId,
    CSeq,
    MaxForwards,
    Expires,
    ContentLength,
    ContentType,
    Allow,
    UserAgent,
    WWWAuthenticate,
    Authorization,
    Other
);
