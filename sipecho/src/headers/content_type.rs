use core::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::macros::parse_header_param;
use crate::message::Params;
use crate::parser::Parser;

/// A mime type, e.g. `application/sdp`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MimeType<'a> {
    /// The type, e.g. `application`.
    pub mtype: &'a str,
    /// The subtype, e.g. `sdp`.
    pub subtype: &'a str,
}

/// A media type with optional parameters.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MediaType<'a> {
    /// The mime type.
    pub mimetype: MimeType<'a>,
    /// Any parameters, e.g. `charset`.
    pub param: Option<Params<'a>>,
}

impl<'a> MediaType<'a> {
    /// Creates a `MediaType` without parameters.
    pub const fn new(mtype: &'a str, subtype: &'a str) -> Self {
        MediaType {
            mimetype: MimeType { mtype, subtype },
            param: None,
        }
    }

    pub(crate) fn parse(parser: &mut Parser<'a>) -> Result<Self> {
        let mtype = parser.parse_token()?;
        parser.must_read(b'/')?;
        let subtype = parser.parse_token()?;
        let param = parse_header_param!(parser);

        Ok(MediaType {
            mimetype: MimeType { mtype, subtype },
            param,
        })
    }
}

impl fmt::Display for MediaType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.mimetype.mtype, self.mimetype.subtype)?;
        if let Some(param) = &self.param {
            write!(f, ";{}", param)?;
        }
        Ok(())
    }
}

/// The `Content-Type` header.
///
/// Indicates the media type of the message body sent to the
/// recipient.
///
/// # Examples
///
/// ```
/// # use sipecho::headers::{ContentType, MediaType};
/// let ctype = ContentType::new_sdp();
///
/// assert_eq!("Content-Type: application/sdp", ctype.to_string());
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ContentType<'a>(MediaType<'a>);

impl<'a> ContentType<'a> {
    /// Creates a `Content-Type` for `application/sdp`.
    pub const fn new_sdp() -> Self {
        ContentType(MediaType::new("application", "sdp"))
    }

    /// Creates a `Content-Type` from a media type.
    pub const fn new(media_type: MediaType<'a>) -> Self {
        ContentType(media_type)
    }

    /// Returns the media type.
    pub const fn media_type(&self) -> &MediaType<'a> {
        &self.0
    }

    /// Returns `true` if the body is `application/sdp`.
    pub fn is_sdp(&self) -> bool {
        self.0.mimetype.mtype.eq_ignore_ascii_case("application")
            && self.0.mimetype.subtype.eq_ignore_ascii_case("sdp")
    }
}

impl<'a> SipHeaderParse<'a> for ContentType<'a> {
    const NAME: &'static str = "Content-Type";
    const SHORT_NAME: &'static str = "c";

    /*
     * Content-Type     =  ( "Content-Type" / "c" ) HCOLON media-type
     * media-type       =  m-type SLASH m-subtype *(SEMI m-parameter)
     * m-type           =  discrete-type / composite-type
     * discrete-type    =  "text" / "image" / "audio" / "video"
     *                     / "application" / extension-token
     * composite-type   =  "message" / "multipart" / extension-token
     * m-subtype        =  extension-token / iana-token
     * m-parameter      =  m-attribute EQUAL m-value
     */
    fn parse(parser: &mut Parser<'a>) -> Result<Self> {
        let media_type = MediaType::parse(parser)?;

        Ok(ContentType(media_type))
    }
}

impl fmt::Display for ContentType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", ContentType::NAME, self.0)
    }
}
