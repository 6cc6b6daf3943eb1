use core::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::message::auth::{Challenge, DigestChallenge};
use crate::parser::Parser;

/// The `WWW-Authenticate` header.
///
/// Carries at least one challenge with the authentication
/// scheme and parameters applicable to the `Request-URI`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct WWWAuthenticate<'a>(Challenge<'a>);

impl<'a> WWWAuthenticate<'a> {
    /// Returns the challenge.
    pub const fn challenge(&self) -> &Challenge<'a> {
        &self.0
    }

    /// Returns the challenge if it uses the digest scheme.
    pub const fn digest(&self) -> Option<&DigestChallenge<'a>> {
        self.0.digest()
    }
}

impl<'a> SipHeaderParse<'a> for WWWAuthenticate<'a> {
    const NAME: &'static str = "WWW-Authenticate";

    /*
     * WWW-Authenticate  =  "WWW-Authenticate" HCOLON challenge
     */
    fn parse(parser: &mut Parser<'a>) -> Result<Self> {
        let challenge = parser.parse_auth_challenge()?;

        Ok(WWWAuthenticate(challenge))
    }
}

impl fmt::Display for WWWAuthenticate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", WWWAuthenticate::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"Digest realm=\"atlanta.com\",\
        domain=\"sip:boxesbybob.com\", qop=\"auth\",\
        nonce=\"f84f1cec41e6cbe5aea9c8e88d359\",\
        opaque=\"\", stale=FALSE, algorithm=MD5";
        let mut parser = Parser::new(src);

        let www_auth = WWWAuthenticate::parse(&mut parser).unwrap();

        assert_matches!(www_auth.0, Challenge::Digest(DigestChallenge { realm, domain, nonce, opaque, stale, algorithm, qop, .. }) => {
            assert_eq!(realm, Some("atlanta.com"));
            assert_eq!(algorithm, Some("MD5"));
            assert_eq!(domain, Some("sip:boxesbybob.com"));
            assert_eq!(qop, Some("auth"));
            assert_eq!(nonce, Some("f84f1cec41e6cbe5aea9c8e88d359"));
            assert_eq!(opaque, Some(""));
            assert_eq!(stale, Some("FALSE"));
        });
    }
}
