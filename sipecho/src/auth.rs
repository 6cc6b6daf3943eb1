//! Digest access authentication.
//!
//! Implements the client side of RFC 2617 digest authentication
//! as SIP uses it: answering a `WWW-Authenticate` challenge with
//! the credentials of a local account.

use md5::compute as md5_compute;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::message::auth::DigestChallenge;
use crate::message::SipMethod;

/// The only digest algorithm supported.
const ALGORITHM_MD5: &str = "MD5";

/// The nonce count sent with a `qop=auth` answer.
///
/// Every answer starts from a fresh server nonce, so the count
/// never goes beyond one.
const NONCE_COUNT: &str = "00000001";

const QOP_AUTH: &str = "auth";

/// The credentials of a local SIP account.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// The account user name.
    pub username: String,
    /// The account password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials from a user name and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Answers a digest challenge for a request of `method` sent
    /// to `uri`.
    ///
    /// Only the `MD5` algorithm is supported, with `qop=auth`
    /// when the challenge offers it.
    pub fn answer(&self, challenge: &DigestChallenge<'_>, method: SipMethod, uri: &str) -> Result<DigestAnswer> {
        let cnonce = Uuid::new_v4().simple().to_string();

        self.answer_with_cnonce(challenge, method, uri, cnonce)
    }

    fn answer_with_cnonce(
        &self,
        challenge: &DigestChallenge<'_>,
        method: SipMethod,
        uri: &str,
        cnonce: String,
    ) -> Result<DigestAnswer> {
        let realm = challenge
            .realm
            .ok_or_else(|| Error::Authentication("Challenge has no realm".into()))?;
        let nonce = challenge
            .nonce
            .ok_or_else(|| Error::Authentication("Challenge has no nonce".into()))?;

        if let Some(algorithm) = challenge.algorithm {
            if !algorithm.eq_ignore_ascii_case(ALGORITHM_MD5) {
                return Err(Error::Authentication(format!(
                    "Unsupported digest algorithm: {}",
                    algorithm
                )));
            }
        }

        let ha1 = hash(&[&self.username, realm, &self.password]);
        let ha2 = hash(&[method.as_str(), uri]);

        match challenge.qop {
            None => Ok(DigestAnswer {
                response: hash(&[&ha1, nonce, &ha2]),
                cnonce: None,
                nc: None,
                qop: None,
            }),
            // The qop value lists options, of which only `auth` is
            // supported.
            Some(qop) if qop.split(',').any(|q| q.trim().eq_ignore_ascii_case(QOP_AUTH)) => {
                let response = hash(&[&ha1, nonce, NONCE_COUNT, &cnonce, QOP_AUTH, &ha2]);

                Ok(DigestAnswer {
                    response,
                    cnonce: Some(cnonce),
                    nc: Some(NONCE_COUNT),
                    qop: Some(QOP_AUTH),
                })
            }
            Some(qop) => Err(Error::Authentication(format!("Unsupported qop: {}", qop))),
        }
    }
}

/// A computed answer to a digest challenge.
///
/// The owned values back the `Authorization` header of the
/// retried request.
#[derive(Debug)]
pub struct DigestAnswer {
    /// The computed request digest.
    pub response: String,
    /// The client nonce, present when `qop=auth` was negotiated.
    pub cnonce: Option<String>,
    /// The nonce count, present when `qop=auth` was negotiated.
    pub nc: Option<&'static str>,
    /// The negotiated quality of protection.
    pub qop: Option<&'static str>,
}

fn hash(parts: &[&str]) -> String {
    format!("{:x}", md5_compute(parts.join(":").as_bytes()))
}
