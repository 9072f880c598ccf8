use crate::{checksum, ProtoError};

/// Max payload carried by one CRTP frame.
pub const MAX_PAYLOAD: usize = 30;

/// Keep-alive datagram sent once per connect. Never run through `decode`.
pub const NULL_PACKET: [u8; 2] = [0xFF, 0xFF];

/// Logical subsystem selected by the high nibble of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrtpPort {
    Console,
    Param,
    Commander,
    Mem,
    Log,
    Localization,
    SetpointGeneric,
    SetpointHl,
    /// Battery / platform status.
    Platform,
    Link,
    Reserved(u8),
}

impl CrtpPort {
    /// Maps a header nibble to a port. Values above 15 are masked.
    pub fn from_nibble(n: u8) -> Self {
        match n & 0x0F {
            0x0 => Self::Console,
            0x2 => Self::Param,
            0x3 => Self::Commander,
            0x4 => Self::Mem,
            0x5 => Self::Log,
            0x6 => Self::Localization,
            0x7 => Self::SetpointGeneric,
            0x8 => Self::SetpointHl,
            0xD => Self::Platform,
            0xF => Self::Link,
            other => Self::Reserved(other),
        }
    }

    pub fn nibble(self) -> u8 {
        match self {
            Self::Console => 0x0,
            Self::Param => 0x2,
            Self::Commander => 0x3,
            Self::Mem => 0x4,
            Self::Log => 0x5,
            Self::Localization => 0x6,
            Self::SetpointGeneric => 0x7,
            Self::SetpointHl => 0x8,
            Self::Platform => 0xD,
            Self::Link => 0xF,
            Self::Reserved(n) => n,
        }
    }
}

/// One decoded or about-to-be-sent CRTP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrtpPacket {
    pub port: u8,
    pub channel: u8,
    pub payload: Vec<u8>,
}

impl CrtpPacket {
    pub fn new(port: u8, channel: u8, payload: &[u8]) -> Result<Self, ProtoError> {
        validate(port, channel, payload)?;
        Ok(Self { port, channel, payload: payload.to_vec() })
    }

    pub fn header(&self) -> u8 {
        header(self.port, self.channel)
    }

    pub fn crtp_port(&self) -> CrtpPort {
        CrtpPort::from_nibble(self.port)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        frame(self.header(), &self.payload)
    }
}

fn header(port: u8, channel: u8) -> u8 {
    ((port & 0x0F) << 4) | (channel & 0x03)
}

fn validate(port: u8, channel: u8, payload: &[u8]) -> Result<(), ProtoError> {
    if port > 0x0F {
        return Err(ProtoError::PortOutOfRange(port));
    }
    if channel > 0x03 {
        return Err(ProtoError::ChannelOutOfRange(channel));
    }
    if payload.len() > MAX_PAYLOAD {
        return Err(ProtoError::PayloadTooLong { len: payload.len(), max: MAX_PAYLOAD });
    }
    Ok(())
}

fn frame(header: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(header);
    out.extend_from_slice(payload);
    out.push(checksum(&out));
    out
}

/// `header | payload | checksum`, header = `port << 4 | channel`.
pub fn encode(port: u8, channel: u8, payload: &[u8]) -> Result<Vec<u8>, ProtoError> {
    validate(port, channel, payload)?;
    Ok(frame(header(port, channel), payload))
}

/// Verifies the trailing checksum and splits the header. Bits 3-2 of the header are ignored.
pub fn decode(bytes: &[u8]) -> Result<CrtpPacket, ProtoError> {
    if bytes.len() < 2 {
        return Err(ProtoError::TooShort(bytes.len()));
    }
    let (body, tail) = bytes.split_at(bytes.len() - 1);
    let expected = checksum(body);
    if expected != tail[0] {
        return Err(ProtoError::Checksum { expected, actual: tail[0] });
    }

    Ok(CrtpPacket {
        port: (body[0] >> 4) & 0x0F,
        channel: body[0] & 0x03,
        payload: body[1..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let bytes = encode(0x3, 0x1, &[0x10, 0x20]).unwrap();
        assert_eq!(bytes, vec![0x31, 0x10, 0x20, 0x61]);
    }

    #[test]
    fn round_trip_across_ports_and_lengths() {
        for port in 0..=15u8 {
            for channel in 0..=3u8 {
                for len in [0usize, 1, 14, 29, 30] {
                    let payload: Vec<u8> = (0..len as u8).map(|b| b.wrapping_mul(37).wrapping_add(port)).collect();
                    let bytes = encode(port, channel, &payload).unwrap();
                    let pkt = decode(&bytes).unwrap();
                    assert_eq!((pkt.port, pkt.channel, pkt.payload), (port, channel, payload));
                }
            }
        }
    }

    #[test]
    fn rejects_out_of_range_inputs() {
        assert_eq!(encode(16, 0, &[]), Err(ProtoError::PortOutOfRange(16)));
        assert_eq!(encode(0, 4, &[]), Err(ProtoError::ChannelOutOfRange(4)));
        assert_eq!(
            encode(0, 0, &[0u8; 31]),
            Err(ProtoError::PayloadTooLong { len: 31, max: 30 })
        );
    }

    #[test]
    fn corrupted_checksum_is_reported() {
        let mut bytes = encode(0xD, 0, &[1, 2, 3, 4]).unwrap();
        let last = bytes.len() - 1;
        for delta in 1..=255u8 {
            let mut bad = bytes.clone();
            bad[last] = bytes[last].wrapping_add(delta);
            assert!(matches!(decode(&bad), Err(ProtoError::Checksum { .. })));
        }
        bytes[last] ^= 0xFF;
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn header_only_frame_has_empty_payload() {
        let pkt = decode(&[0x00, 0x00]).unwrap();
        assert_eq!(pkt.port, 0);
        assert!(pkt.payload.is_empty());
        assert_eq!(decode(&[0x00]), Err(ProtoError::TooShort(1)));
    }

    #[test]
    fn port_nibbles_map_both_ways() {
        assert_eq!(CrtpPort::from_nibble(0xD), CrtpPort::Platform);
        assert_eq!(CrtpPort::from_nibble(0x0), CrtpPort::Console);
        assert_eq!(CrtpPort::from_nibble(0x1), CrtpPort::Reserved(1));
        for n in 0..=15u8 {
            assert_eq!(CrtpPort::from_nibble(n).nibble(), n);
        }
    }
}
