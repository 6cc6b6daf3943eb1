use std::fmt;

/// SIP request method.
///
/// Methods that are not part of the supported set parse as
/// [`SipMethod::Unknown`].
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[allow(missing_docs)]
pub enum SipMethod {
    Invite,
    Ack,
    Bye,
    Cancel,
    Register,
    Options,
    Info,
    Notify,
    Subscribe,
    Update,
    Refer,
    Prack,
    Message,
    Publish,
    Unknown,
}

impl SipMethod {
    /// Returns the method token.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SipMethod::Invite => "INVITE",
            SipMethod::Ack => "ACK",
            SipMethod::Bye => "BYE",
            SipMethod::Cancel => "CANCEL",
            SipMethod::Register => "REGISTER",
            SipMethod::Options => "OPTIONS",
            SipMethod::Info => "INFO",
            SipMethod::Notify => "NOTIFY",
            SipMethod::Subscribe => "SUBSCRIBE",
            SipMethod::Update => "UPDATE",
            SipMethod::Refer => "REFER",
            SipMethod::Prack => "PRACK",
            SipMethod::Message => "MESSAGE",
            SipMethod::Publish => "PUBLISH",
            SipMethod::Unknown => "UNKNOWN",
        }
    }

    /// Returns the method token as bytes.
    pub const fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }

    /// Returns `true` if this is an `INVITE`.
    pub const fn is_invite(&self) -> bool {
        matches!(self, SipMethod::Invite)
    }

    /// Returns `true` if this is an `ACK`.
    pub const fn is_ack(&self) -> bool {
        matches!(self, SipMethod::Ack)
    }

    /// Returns `true` if a request with this method can create a dialog.
    pub const fn can_establish_a_dialog(&self) -> bool {
        matches!(self, SipMethod::Invite)
    }
}

impl From<&[u8]> for SipMethod {
    fn from(src: &[u8]) -> Self {
        match src {
            b"INVITE" => SipMethod::Invite,
            b"ACK" => SipMethod::Ack,
            b"BYE" => SipMethod::Bye,
            b"CANCEL" => SipMethod::Cancel,
            b"REGISTER" => SipMethod::Register,
            b"OPTIONS" => SipMethod::Options,
            b"INFO" => SipMethod::Info,
            b"NOTIFY" => SipMethod::Notify,
            b"SUBSCRIBE" => SipMethod::Subscribe,
            b"UPDATE" => SipMethod::Update,
            b"REFER" => SipMethod::Refer,
            b"PRACK" => SipMethod::Prack,
            b"MESSAGE" => SipMethod::Message,
            b"PUBLISH" => SipMethod::Publish,
            _ => SipMethod::Unknown,
        }
    }
}

impl fmt::Display for SipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
