//! SIP Auth types
//!
use std::fmt;

use itertools::Itertools;

use crate::message::Params;

/// The `Digest` authentication scheme.
pub const DIGEST_SCHEME: &str = "Digest";

/// A Digest Challenge.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct DigestChallenge<'a> {
    /// The realm of the digest authentication.
    pub realm: Option<&'a str>,
    /// The protection domain.
    pub domain: Option<&'a str>,
    /// The server nonce.
    pub nonce: Option<&'a str>,
    /// Opaque data to be echoed back.
    pub opaque: Option<&'a str>,
    /// Whether the previous request was rejected because the nonce
    /// was stale.
    pub stale: Option<&'a str>,
    /// The digest algorithm.
    pub algorithm: Option<&'a str>,
    /// The quality of protection options.
    pub qop: Option<&'a str>,
}

/// A challenge found in a `WWW-Authenticate` header.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Challenge<'a> {
    /// A digest challenge.
    Digest(DigestChallenge<'a>),
    /// A challenge of any other scheme.
    Other {
        /// The scheme name.
        scheme: &'a str,
        /// The challenge parameters.
        param: Params<'a>,
    },
}

impl<'a> Challenge<'a> {
    /// Returns the digest challenge, if this is one.
    pub const fn digest(&self) -> Option<&DigestChallenge<'a>> {
        match self {
            Challenge::Digest(digest) => Some(digest),
            Challenge::Other { .. } => None,
        }
    }
}

/// A Digest Credential.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct DigestCredential<'a> {
    /// The realm the credential applies to.
    pub realm: Option<&'a str>,
    /// The user name.
    pub username: Option<&'a str>,
    /// The server nonce being answered.
    pub nonce: Option<&'a str>,
    /// The digest URI.
    pub uri: Option<&'a str>,
    /// The computed digest response.
    pub response: Option<&'a str>,
    /// The digest algorithm.
    pub algorithm: Option<&'a str>,
    /// The client nonce.
    pub cnonce: Option<&'a str>,
    /// Opaque data echoed back from the challenge.
    pub opaque: Option<&'a str>,
    /// The chosen quality of protection.
    pub qop: Option<&'a str>,
    /// The nonce count.
    pub nc: Option<&'a str>,
}

/// A credential carried in an `Authorization` header.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Credential<'a> {
    /// A digest credential.
    Digest(DigestCredential<'a>),
    /// A credential of any other scheme.
    Other {
        /// The scheme name.
        scheme: &'a str,
        /// The credential parameters.
        param: Params<'a>,
    },
}

impl<'a> Credential<'a> {
    /// Returns the digest credential, if this is one.
    pub const fn digest(&self) -> Option<&DigestCredential<'a>> {
        match self {
            Credential::Digest(digest) => Some(digest),
            Credential::Other { .. } => None,
        }
    }
}

// Writes the comma separated `name=value` list of an auth header,
// quoting the values that RFC 2617 defines as quoted-string.
struct ParamWriter {
    first: bool,
}

impl ParamWriter {
    const fn new() -> Self {
        ParamWriter { first: true }
    }

    fn sep(&mut self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first {
            self.first = false;
            Ok(())
        } else {
            f.write_str(", ")
        }
    }

    fn quoted(&mut self, f: &mut fmt::Formatter<'_>, name: &str, value: Option<&str>) -> fmt::Result {
        match value {
            Some(value) => {
                self.sep(f)?;
                write!(f, "{}=\"{}\"", name, value)
            }
            None => Ok(()),
        }
    }

    fn token(&mut self, f: &mut fmt::Formatter<'_>, name: &str, value: Option<&str>) -> fmt::Result {
        match value {
            Some(value) => {
                self.sep(f)?;
                write!(f, "{}={}", name, value)
            }
            None => Ok(()),
        }
    }
}

impl fmt::Display for DigestChallenge<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", DIGEST_SCHEME)?;

        let mut w = ParamWriter::new();
        w.quoted(f, "realm", self.realm)?;
        w.quoted(f, "domain", self.domain)?;
        w.quoted(f, "nonce", self.nonce)?;
        w.quoted(f, "opaque", self.opaque)?;
        w.token(f, "stale", self.stale)?;
        w.token(f, "algorithm", self.algorithm)?;
        w.quoted(f, "qop", self.qop)?;

        Ok(())
    }
}

impl fmt::Display for Challenge<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Challenge::Digest(digest) => write!(f, "{}", digest),
            Challenge::Other { scheme, param } => {
                write!(f, "{} {}", scheme, param.iter().format(", "))
            }
        }
    }
}

impl fmt::Display for DigestCredential<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", DIGEST_SCHEME)?;

        let mut w = ParamWriter::new();
        w.quoted(f, "username", self.username)?;
        w.quoted(f, "realm", self.realm)?;
        w.quoted(f, "nonce", self.nonce)?;
        w.quoted(f, "uri", self.uri)?;
        w.quoted(f, "response", self.response)?;
        w.token(f, "algorithm", self.algorithm)?;
        w.quoted(f, "cnonce", self.cnonce)?;
        w.quoted(f, "opaque", self.opaque)?;
        w.token(f, "qop", self.qop)?;
        w.token(f, "nc", self.nc)?;

        Ok(())
    }
}

impl fmt::Display for Credential<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Digest(digest) => write!(f, "{}", digest),
            Credential::Other { scheme, param } => {
                write!(f, "{} {}", scheme, param.iter().format(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_display_quotes_values() {
        let credential = Credential::Digest(DigestCredential {
            username: Some("alice"),
            realm: Some("atlanta.example.com"),
            nonce: Some("84a4cc6f3082121f32b42a2187831a9e"),
            uri: Some("sip:ss2.biloxi.example.com"),
            response: Some("7587245234b3434cc3412213e5f113a5"),
            algorithm: Some("MD5"),
            ..Default::default()
        });

        assert_eq!(
            credential.to_string(),
            "Digest username=\"alice\", realm=\"atlanta.example.com\", \
             nonce=\"84a4cc6f3082121f32b42a2187831a9e\", uri=\"sip:ss2.biloxi.example.com\", \
             response=\"7587245234b3434cc3412213e5f113a5\", algorithm=MD5"
        );
    }
}
