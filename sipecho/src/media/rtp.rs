//! RTP packet framing (RFC 3550).
//!
//! Only the 12-byte fixed header is produced on send. On receive,
//! CSRC entries and header extensions are skipped and padding is
//! stripped, so the returned payload slice is exactly the codec
//! data.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Protocol version carried in the first two bits.
const VERSION: u8 = 2;

/// Size of the fixed header.
pub const HEADER_LEN: usize = 12;

/// The fixed RTP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Marker bit, set on the first packet of a talkspurt.
    pub marker: bool,
    /// Payload type identifying the codec.
    pub payload_type: u8,
    /// Sequence number, incremented per packet.
    pub sequence: u16,
    /// Sampling instant of the first payload byte.
    pub timestamp: u32,
    /// Synchronization source of the sender.
    pub ssrc: u32,
}

impl RtpHeader {
    /// Splits a datagram into its header and payload.
    pub fn decode(buf: &[u8]) -> Result<(RtpHeader, &[u8])> {
        if buf.len() < HEADER_LEN {
            return Err(Error::Rtp("Packet shorter than the fixed header"));
        }
        if buf[0] >> 6 != VERSION {
            return Err(Error::Rtp("Unsupported RTP version"));
        }

        let padding = buf[0] & 0x20 != 0;
        let extension = buf[0] & 0x10 != 0;
        let csrc_count = (buf[0] & 0x0F) as usize;

        let header = RtpHeader {
            marker: buf[1] & 0x80 != 0,
            payload_type: buf[1] & 0x7F,
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        };

        let mut payload_start = HEADER_LEN + csrc_count * 4;
        if extension {
            let length_field = payload_start + 2;
            if buf.len() < length_field + 2 {
                return Err(Error::Rtp("Truncated header extension"));
            }
            let words = u16::from_be_bytes([buf[length_field], buf[length_field + 1]]) as usize;
            payload_start += 4 + words * 4;
        }

        let mut payload_end = buf.len();
        if padding {
            let pad = buf[payload_end - 1] as usize;
            if pad == 0 || pad > payload_end {
                return Err(Error::Rtp("Invalid padding length"));
            }
            payload_end -= pad;
        }

        if buf.len() < payload_start || payload_end < payload_start {
            return Err(Error::Rtp("Truncated packet"));
        }

        Ok((header, &buf[payload_start..payload_end]))
    }

    /// Serializes the header followed by `payload`.
    pub fn encode(&self, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());

        buf.put_u8(VERSION << 6);
        buf.put_u8(((self.marker as u8) << 7) | (self.payload_type & 0x7F));
        buf.put_u16(self.sequence);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        buf.put_slice(payload);

        buf.freeze()
    }
}
