use core::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::message::auth::Credential;
use crate::parser::Parser;

/// The `Authorization` header.
///
/// Contains the authentication credentials of a user agent.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Authorization<'a>(pub Credential<'a>);

impl<'a> Authorization<'a> {
    /// Returns the credential.
    pub const fn credential(&self) -> &Credential<'a> {
        &self.0
    }
}

impl<'a> SipHeaderParse<'a> for Authorization<'a> {
    const NAME: &'static str = "Authorization";

    /*
     * Authorization     =  "Authorization" HCOLON credentials
     * credentials       =  ("Digest" LWS digest-response)
     *                      / other-response
     * digest-response   =  dig-resp *(COMMA dig-resp)
     * dig-resp          =  username / realm / nonce / digest-uri
     *                      / dresponse / algorithm / cnonce
     *                      / opaque / message-qop
     *                      / nonce-count / auth-param
     * username          =  "username" EQUAL username-value
     * username-value    =  quoted-string
     * message-qop       =  "qop" EQUAL qop-value
     * nonce-count       =  "nc" EQUAL nc-value
     * nc-value          =  8LHEX
     * dresponse         =  "response" EQUAL request-digest
     * request-digest    =  LDQUOT 32LHEX RDQUOT
     * auth-param        =  auth-param-name EQUAL
     *                      ( token / quoted-string )
     */
    fn parse(parser: &mut Parser<'a>) -> Result<Self> {
        let credential = parser.parse_auth_credential()?;

        Ok(Authorization(credential))
    }
}

impl fmt::Display for Authorization<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Authorization::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::auth::DigestCredential;

    #[test]
    fn test_parse() {
        let src = b"Digest username=\"Alice\", realm=\"atlanta.com\", \
        nonce=\"84a4cc6f3082121f32b42a2187831a9e\", \
        response=\"7587245234b3434cc3412213e5f113a5432\"\r\n";
        let mut parser = Parser::new(src);

        let auth = Authorization::parse(&mut parser).unwrap();

        assert_matches!(auth.credential(), &Credential::Digest(DigestCredential { username, realm, nonce, response, .. }) => {
            assert_eq!(username, Some("Alice"));
            assert_eq!(realm, Some("atlanta.com"));
            assert_eq!(nonce, Some("84a4cc6f3082121f32b42a2187831a9e"));
            assert_eq!(response, Some("7587245234b3434cc3412213e5f113a5432"));
        });
    }
}
