//! Minimal SDP handling (RFC 8866 subset).
//!
//! Parses just enough of an audio offer to negotiate a G.711
//! answer: the connection address, the `m=audio` line and the
//! direction attribute. Everything else, video sections included,
//! is ignored.

use std::net::{IpAddr, SocketAddr};
use std::str;

use crate::error::{Error, Result};
use crate::media::g711::Codec;

/// Stream direction negotiated by an `a=` attribute.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Both directions, the default when no attribute is present.
    #[default]
    SendRecv,
    /// The peer only sends.
    SendOnly,
    /// The peer only receives.
    RecvOnly,
    /// No media flows.
    Inactive,
}

/// The audio parameters drawn from an SDP offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioOffer {
    /// Where the peer wants its audio sent, from the connection
    /// address and the audio port.
    pub addr: SocketAddr,
    /// Payload types listed on the audio line, in offer order.
    pub payloads: Vec<u8>,
    /// Direction requested by the offer.
    pub direction: Direction,
}

impl AudioOffer {
    /// Extracts the audio stream parameters from an SDP body.
    ///
    /// The first `m=audio` line wins; other media sections and
    /// their attributes are skipped.
    pub fn parse(body: &[u8]) -> Result<AudioOffer> {
        let text = str::from_utf8(body).map_err(|_| Error::Sdp("Offer is not valid UTF-8".into()))?;

        let mut connection: Option<IpAddr> = None;
        let mut audio: Option<(u16, Vec<u8>)> = None;
        let mut direction = Direction::SendRecv;
        // Lines before any m= are session level and apply to the
        // audio stream; after a foreign m= they no longer do.
        let mut in_audio = true;

        for line in text.lines() {
            let Some((kind, value)) = line.trim_end().split_once('=') else {
                continue;
            };

            match (kind, in_audio) {
                ("c", true) => {
                    let addr = value
                        .strip_prefix("IN IP4 ")
                        .or_else(|| value.strip_prefix("IN IP6 "))
                        .ok_or_else(|| Error::Sdp(format!("Unsupported connection line: c={}", value)))?;
                    let ip = addr
                        .trim()
                        .parse()
                        .map_err(|_| Error::Sdp(format!("Invalid connection address: {}", addr)))?;
                    connection = Some(ip);
                }
                ("m", _) => {
                    let mut fields = value.split_whitespace();
                    if fields.next() == Some("audio") && audio.is_none() {
                        let port = fields
                            .next()
                            .and_then(|port| port.parse::<u16>().ok())
                            .ok_or_else(|| Error::Sdp(format!("Invalid media line: m={}", value)))?;
                        if fields.next() != Some("RTP/AVP") {
                            return Err(Error::Sdp(format!("Unsupported media protocol: m={}", value)));
                        }
                        let payloads = fields.filter_map(|pt| pt.parse().ok()).collect();
                        audio = Some((port, payloads));
                        in_audio = true;
                    } else {
                        in_audio = false;
                    }
                }
                ("a", true) => match value.trim() {
                    "sendrecv" => direction = Direction::SendRecv,
                    "sendonly" => direction = Direction::SendOnly,
                    "recvonly" => direction = Direction::RecvOnly,
                    "inactive" => direction = Direction::Inactive,
                    _ => {}
                },
                _ => {}
            }
        }

        let (port, payloads) = audio.ok_or_else(|| Error::Sdp("Offer has no audio stream".into()))?;
        if port == 0 {
            return Err(Error::Sdp("Audio stream is declined (port 0)".into()));
        }
        let ip = connection.ok_or_else(|| Error::Sdp("Offer has no connection address".into()))?;

        Ok(AudioOffer {
            addr: SocketAddr::new(ip, port),
            payloads,
            direction,
        })
    }

    /// Picks the G.711 codec for the answer, PCMU preferred.
    pub fn negotiate(&self) -> Option<Codec> {
        Codec::negotiate(&self.payloads)
    }
}

/// Builds the SDP answer for a negotiated G.711 stream.
///
/// One audio line carrying the agreed payload type, `sendrecv`,
/// 20 ms packetization. The session id doubles as the version.
pub fn build_answer(addr: SocketAddr, codec: Codec, session_id: u64) -> String {
    let ip_version = if addr.is_ipv4() { "IP4" } else { "IP6" };

    format!(
        concat!(
            "v=0\r\n",
            "o=- {sid} {sid} IN {ipv} {ip}\r\n",
            "s=sipecho\r\n",
            "c=IN {ipv} {ip}\r\n",
            "t=0 0\r\n",
            "m=audio {port} RTP/AVP {pt}\r\n",
            "a=rtpmap:{pt} {codec}/8000\r\n",
            "a=ptime:20\r\n",
            "a=sendrecv\r\n",
        ),
        sid = session_id,
        ipv = ip_version,
        ip = addr.ip(),
        port = addr.port(),
        pt = codec.payload_type(),
        codec = codec.name(),
    )
}
