//! G.711 audio companding.
//!
//! Byte-for-sample codecs per ITU-T G.711: μ-law (PCMU) and A-law
//! (PCMA), both at 8 kHz. One encoded byte expands to one 16-bit
//! linear sample.

use std::fmt;

/// Static RTP payload type assigned to PCMU (RFC 3551).
pub const PAYLOAD_TYPE_PCMU: u8 = 0;

/// Static RTP payload type assigned to PCMA (RFC 3551).
pub const PAYLOAD_TYPE_PCMA: u8 = 8;

const BIAS: i32 = 0x84;

const SEG_UEND: [i32; 8] = [0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF, 0x1FFF, 0x3FFF, 0x7FFF];
const SEG_AEND: [i32; 8] = [0x1F, 0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF];

/// The supported G.711 companding laws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// μ-law, payload type 0.
    Pcmu,
    /// A-law, payload type 8.
    Pcma,
}

impl Codec {
    /// Picks the answer codec from the payload types an offer
    /// lists, preferring PCMU.
    pub fn negotiate(offered: &[u8]) -> Option<Codec> {
        if offered.contains(&PAYLOAD_TYPE_PCMU) {
            Some(Codec::Pcmu)
        } else if offered.contains(&PAYLOAD_TYPE_PCMA) {
            Some(Codec::Pcma)
        } else {
            None
        }
    }

    /// The RTP payload type of this codec.
    pub fn payload_type(&self) -> u8 {
        match self {
            Codec::Pcmu => PAYLOAD_TYPE_PCMU,
            Codec::Pcma => PAYLOAD_TYPE_PCMA,
        }
    }

    /// The encoding name used in `rtpmap` attributes.
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Pcmu => "PCMU",
            Codec::Pcma => "PCMA",
        }
    }

    /// Expands one encoded byte to a linear sample.
    pub fn decode_sample(&self, encoded: u8) -> i16 {
        match self {
            Codec::Pcmu => ulaw_to_linear(encoded),
            Codec::Pcma => alaw_to_linear(encoded),
        }
    }

    /// Compresses one linear sample to an encoded byte.
    pub fn encode_sample(&self, sample: i16) -> u8 {
        match self {
            Codec::Pcmu => linear_to_ulaw(sample),
            Codec::Pcma => linear_to_alaw(sample),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Expands a μ-law byte to a 16-bit linear sample.
pub fn ulaw_to_linear(ulaw: u8) -> i16 {
    let u = !ulaw;
    let mut t = (((u & 0x0F) as i16) << 3) + BIAS as i16;
    t <<= (u & 0x70) >> 4;

    if u & 0x80 != 0 { BIAS as i16 - t } else { t - BIAS as i16 }
}

/// Compresses a 16-bit linear sample to a μ-law byte.
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut value = sample as i32;
    let mask: u8 = if value < 0 {
        value = BIAS - value;
        0x7F
    } else {
        value += BIAS;
        0xFF
    };

    match SEG_UEND.iter().position(|&end| value <= end) {
        // Louder than the last segment, clamp to the loudest code.
        None => 0x7F ^ mask,
        Some(seg) => {
            let byte = ((seg as u8) << 4) | ((value >> (seg + 3)) & 0x0F) as u8;
            byte ^ mask
        }
    }
}

/// Expands an A-law byte to a 16-bit linear sample.
pub fn alaw_to_linear(alaw: u8) -> i16 {
    let a = alaw ^ 0x55;
    let mut t = ((a & 0x0F) as i16) << 4;
    let seg = (a & 0x70) >> 4;
    match seg {
        0 => t += 8,
        1 => t += 0x108,
        _ => {
            t += 0x108;
            t <<= seg - 1;
        }
    }

    if a & 0x80 != 0 { t } else { -t }
}

/// Compresses a 16-bit linear sample to an A-law byte.
pub fn linear_to_alaw(sample: i16) -> u8 {
    let mut value = (sample as i32) >> 3;
    let mask: u8 = if value >= 0 {
        0xD5
    } else {
        value = -value - 1;
        0x55
    };

    match SEG_AEND.iter().position(|&end| value <= end) {
        None => 0x7F ^ mask,
        Some(seg) => {
            let shift = if seg < 2 { 1 } else { seg };
            let byte = ((seg as u8) << 4) | ((value >> shift) & 0x0F) as u8;
            byte ^ mask
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ulaw_known_values() {
        assert_eq!(ulaw_to_linear(0xFF), 0);
        assert_eq!(ulaw_to_linear(0x7F), 0);
        assert_eq!(ulaw_to_linear(0x00), -32124);
        assert_eq!(ulaw_to_linear(0x80), 32124);

        assert_eq!(linear_to_ulaw(0), 0xFF);
        assert_eq!(linear_to_ulaw(-32768), 0x00);
        assert_eq!(linear_to_ulaw(32767), 0x80);
    }

    #[test]
    fn test_alaw_known_values() {
        assert_eq!(alaw_to_linear(0xD5), 8);
        assert_eq!(alaw_to_linear(0x55), -8);
        assert_eq!(alaw_to_linear(0x2A), -32256);
        assert_eq!(alaw_to_linear(0xAA), 32256);

        assert_eq!(linear_to_alaw(0), 0xD5);
        assert_eq!(linear_to_alaw(-32768), 0x2A);
        assert_eq!(linear_to_alaw(32767), 0xAA);
    }

    #[test]
    fn test_every_ulaw_code_round_trips() {
        for code in 0..=255u8 {
            // 0x7F is negative zero, which folds onto 0xFF.
            let expect = if code == 0x7F { 0xFF } else { code };
            assert_eq!(linear_to_ulaw(ulaw_to_linear(code)), expect, "code {code:#04x}");
        }
    }

    #[test]
    fn test_every_alaw_code_round_trips() {
        for code in 0..=255u8 {
            assert_eq!(linear_to_alaw(alaw_to_linear(code)), code, "code {code:#04x}");
        }
    }

    #[test]
    fn test_negotiate_prefers_pcmu() {
        assert_eq!(Codec::negotiate(&[8, 0, 101]), Some(Codec::Pcmu));
        assert_eq!(Codec::negotiate(&[8, 101]), Some(Codec::Pcma));
        assert_eq!(Codec::negotiate(&[96, 101]), None);
        assert_eq!(Codec::negotiate(&[]), None);
    }
}
