//! # sipecho
//!
//! A SIP answering machine library.
//!
//! The crate registers an account at a SIP server, answers every
//! incoming call, records the caller audio to a WAV file and echoes
//! the same audio back over RTP. The [`Endpoint`] owns the transport
//! and transaction layers, the [`ua`] module implements the user
//! agent behavior on top of them.

pub mod auth;
pub mod endpoint;
pub mod headers;
pub mod media;
pub mod message;
pub mod parser;
pub mod service;
pub mod transaction;
pub mod transport;
pub mod ua;

pub(crate) mod error;
pub(crate) mod macros;

pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use service::SipService;

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

use std::net::SocketAddr;

use rand::distr::{Alphanumeric, SampleString};
use uuid::Uuid;

/// The magic cookie that starts every Via branch (RFC 3261).
pub(crate) const BRANCH_COOKIE: &str = "z9hG4bK";

/// Generates an unique Via branch parameter.
pub(crate) fn generate_branch() -> String {
    format!("{}{}", BRANCH_COOKIE, Uuid::new_v4().simple())
}

/// Generates a tag parameter for `From` and `To` headers.
pub(crate) fn generate_tag() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 10)
}

pub(crate) fn get_local_name(addr: &SocketAddr) -> String {
    let ip = local_ip_address::local_ip().unwrap_or(addr.ip());
    let local_name = format!("{}:{}", ip, addr.port());

    local_name
}
