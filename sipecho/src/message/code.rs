use std::fmt;

use crate::error::SipParserError;

macro_rules! status_codes {
    ($($variant:ident = $code:literal, $reason:literal;)*) => {
        /// SIP response status code.
        ///
        /// Covers the codes defined by RFC 3261 section 21.
        #[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
        #[repr(u16)]
        pub enum StatusCode {
            $(
                #[doc = $reason]
                $variant = $code,
            )*
        }

        impl StatusCode {
            /// Returns the default reason phrase for this code.
            pub const fn reason(&self) -> &'static str {
                match self {
                    $(StatusCode::$variant => $reason,)*
                }
            }
        }

        impl TryFrom<u16> for StatusCode {
            type Error = SipParserError;

            fn try_from(code: u16) -> Result<Self, Self::Error> {
                match code {
                    $($code => Ok(StatusCode::$variant),)*
                    _ => Err(SipParserError::from(format!("Unknown status code '{}'", code))),
                }
            }
        }
    };
}

status_codes! {
    Trying = 100, "Trying";
    Ringing = 180, "Ringing";
    CallIsBeingForwarded = 181, "Call Is Being Forwarded";
    Queued = 182, "Queued";
    SessionProgress = 183, "Session Progress";

    Ok = 200, "OK";
    Accepted = 202, "Accepted";

    MultipleChoices = 300, "Multiple Choices";
    MovedPermanently = 301, "Moved Permanently";
    MovedTemporarily = 302, "Moved Temporarily";
    UseProxy = 305, "Use Proxy";
    AlternativeService = 380, "Alternative Service";

    BadRequest = 400, "Bad Request";
    Unauthorized = 401, "Unauthorized";
    PaymentRequired = 402, "Payment Required";
    Forbidden = 403, "Forbidden";
    NotFound = 404, "Not Found";
    MethodNotAllowed = 405, "Method Not Allowed";
    NotAcceptable = 406, "Not Acceptable";
    ProxyAuthenticationRequired = 407, "Proxy Authentication Required";
    RequestTimeout = 408, "Request Timeout";
    Gone = 410, "Gone";
    RequestEntityTooLarge = 413, "Request Entity Too Large";
    RequestUriTooLong = 414, "Request-URI Too Long";
    UnsupportedMediaType = 415, "Unsupported Media Type";
    UnsupportedUriScheme = 416, "Unsupported URI Scheme";
    BadExtension = 420, "Bad Extension";
    ExtensionRequired = 421, "Extension Required";
    IntervalTooBrief = 423, "Interval Too Brief";
    TemporarilyUnavailable = 480, "Temporarily Unavailable";
    CallOrTransactionDoesNotExist = 481, "Call/Transaction Does Not Exist";
    LoopDetected = 482, "Loop Detected";
    TooManyHops = 483, "Too Many Hops";
    AddressIncomplete = 484, "Address Incomplete";
    Ambiguous = 485, "Ambiguous";
    BusyHere = 486, "Busy Here";
    RequestTerminated = 487, "Request Terminated";
    NotAcceptableHere = 488, "Not Acceptable Here";
    RequestPending = 491, "Request Pending";
    Undecipherable = 493, "Undecipherable";

    ServerInternalError = 500, "Server Internal Error";
    NotImplemented = 501, "Not Implemented";
    BadGateway = 502, "Bad Gateway";
    ServiceUnavailable = 503, "Service Unavailable";
    ServerTimeout = 504, "Server Time-out";
    VersionNotSupported = 505, "Version Not Supported";
    MessageTooLarge = 513, "Message Too Large";

    BusyEverywhere = 600, "Busy Everywhere";
    Decline = 603, "Decline";
    DoesNotExistAnywhere = 604, "Does Not Exist Anywhere";
    NotAcceptableAnywhere = 606, "Not Acceptable";
}

impl StatusCode {
    /// Returns the numeric value of this code.
    pub const fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Returns `true` for a `1xx` code.
    pub const fn is_provisional(&self) -> bool {
        self.as_u16() < 200
    }

    /// Returns `true` for a `2xx` code.
    pub const fn is_success(&self) -> bool {
        let code = self.as_u16();
        code >= 200 && code < 300
    }

    /// Returns `true` for any final code.
    pub const fn is_final(&self) -> bool {
        !self.is_provisional()
    }
}

impl TryFrom<&[u8]> for StatusCode {
    type Error = SipParserError;

    fn try_from(src: &[u8]) -> Result<Self, Self::Error> {
        let digits = std::str::from_utf8(src).map_err(SipParserError::from)?;
        let code: u16 = digits
            .parse()
            .map_err(|_| SipParserError::from(format!("Invalid status code '{}'", digits)))?;

        code.try_into()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_from_bytes() {
        assert_eq!(StatusCode::try_from(b"200".as_slice()), Ok(StatusCode::Ok));
        assert_eq!(StatusCode::try_from(b"488".as_slice()), Ok(StatusCode::NotAcceptableHere));
        assert!(StatusCode::try_from(b"999".as_slice()).is_err());
    }

    #[test]
    fn test_reason() {
        assert_eq!(StatusCode::Trying.reason(), "Trying");
        assert_eq!(StatusCode::CallOrTransactionDoesNotExist.reason(), "Call/Transaction Does Not Exist");
    }

    #[test]
    fn test_classes() {
        assert!(StatusCode::Ringing.is_provisional());
        assert!(StatusCode::Ok.is_success());
        assert!(StatusCode::NotAcceptableHere.is_final());
        assert!(!StatusCode::Trying.is_final());
    }
}
