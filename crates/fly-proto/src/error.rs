/// Framing and payload errors raised by the codecs in this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtoError {
    #[error("payload too long: {len} bytes (max {max})")]
    PayloadTooLong { len: usize, max: usize },

    #[error("port {0} does not fit in 4 bits")]
    PortOutOfRange(u8),

    #[error("channel {0} does not fit in 2 bits")]
    ChannelOutOfRange(u8),

    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },

    #[error("not a configuration frame (lead byte {0:#04x})")]
    NotConfigFrame(u8),

    #[error("{what} payload too short: {len} bytes (need {need})")]
    ShortPayload { what: &'static str, len: usize, need: usize },
}
