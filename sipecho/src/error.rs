use std::fmt;
use std::str::Utf8Error;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error on parsing
#[derive(Debug, PartialEq, Eq, Error)]
pub struct SipParserError {
    /// Message in error
    pub message: String,
}

impl fmt::Display for SipParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[allow(missing_docs)]
impl SipParserError {
    pub fn new<T>(s: T) -> Self
    where
        T: AsRef<str>,
    {
        Self {
            message: s.as_ref().to_string(),
        }
    }
}

impl std::convert::From<&str> for SipParserError {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl std::convert::From<String> for SipParserError {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl std::convert::From<Utf8Error> for SipParserError {
    fn from(value: Utf8Error) -> Self {
        SipParserError {
            message: format!("{:#?}", value),
        }
    }
}

impl std::convert::From<sipecho_util::Error> for SipParserError {
    fn from(err: sipecho_util::Error) -> Self {
        SipParserError {
            message: format!(
                "Failed to parse at line:{} column:{} kind:{:?}",
                err.line, err.col, err.kind,
            ),
        }
    }
}

impl std::convert::From<tokio::sync::mpsc::error::SendError<crate::transport::TransportEvent>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<crate::transport::TransportEvent>) -> Self {
        Self::ChannelClosed
    }
}

impl std::convert::From<sipecho_util::Error> for Error {
    fn from(err: sipecho_util::Error) -> Self {
        Self::ParseError(err.into())
    }
}

impl std::convert::From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Self::ParseError(value.into())
    }
}

impl std::convert::From<std::fmt::Error> for Error {
    fn from(value: std::fmt::Error) -> Self {
        Self::FmtError(value)
    }
}

/// Errors produced by the endpoint and everything below it.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    ParseError(#[from] SipParserError),

    #[error("Missing required '{0}' header")]
    MissingRequiredHeader(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Transaction timed out")]
    TsxTimeout,

    #[error("Fmt Error")]
    FmtError(std::fmt::Error),

    #[error("Digest authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid SDP: {0}")]
    Sdp(String),

    #[error("Invalid RTP packet: {0}")]
    Rtp(&'static str),

    #[error(transparent)]
    Wav(#[from] hound::Error),
}
