//! Byte classification helpers used by parsers.

/// Returns `true` for an ASCII digit.
#[inline]
pub const fn is_digit(b: u8) -> bool {
    b.is_ascii_digit()
}

/// Returns `true` for an ASCII letter.
#[inline]
pub const fn is_alphabetic(b: u8) -> bool {
    b.is_ascii_alphabetic()
}

/// Returns `true` for a space or horizontal tab.
#[inline]
pub const fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t')
}

/// Returns `true` for a carriage return or line feed.
#[inline]
pub const fn is_newline(b: u8) -> bool {
    matches!(b, b'\r' | b'\n')
}

/// Returns `true` if `port` can be used as a network port.
#[inline]
pub const fn is_valid_port(port: u16) -> bool {
    port > 0
}
