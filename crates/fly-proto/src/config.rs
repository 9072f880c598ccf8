//! Configuration frames: `0xAA | cmd | data(0..=62) | checksum`.
//!
//! These travel over the same UDP link as CRTP traffic but are not CRTP frames.

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::{checksum, ProtoError};

pub const CONFIG_LEAD: u8 = 0xAA;
pub const MAX_CONFIG_DATA: usize = 62;
pub const PID_DATA_LEN: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigCmd {
    WifiSsid,
    WifiPassword,
    FlightParams,
    PidParams,
    DeviceName,
    GeneralConfig,
    PidQuery,
    Test,
    Other(u8),
}

impl ConfigCmd {
    pub fn code(self) -> u8 {
        match self {
            Self::WifiSsid => 0x01,
            Self::WifiPassword => 0x02,
            Self::FlightParams => 0x03,
            Self::PidParams => 0x04,
            Self::DeviceName => 0x05,
            Self::GeneralConfig => 0x06,
            Self::PidQuery => 0x84,
            Self::Test => 0xFF,
            Self::Other(c) => c,
        }
    }

    pub fn from_code(c: u8) -> Self {
        match c {
            0x01 => Self::WifiSsid,
            0x02 => Self::WifiPassword,
            0x03 => Self::FlightParams,
            0x04 => Self::PidParams,
            0x05 => Self::DeviceName,
            0x06 => Self::GeneralConfig,
            0x84 => Self::PidQuery,
            0xFF => Self::Test,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PidAxis {
    Roll,
    Pitch,
    Yaw,
}

impl PidAxis {
    pub const ALL: [PidAxis; 3] = [PidAxis::Roll, PidAxis::Pitch, PidAxis::Yaw];

    pub fn index(self) -> u8 {
        match self {
            Self::Roll => 0,
            Self::Pitch => 1,
            Self::Yaw => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopKind {
    Rate,
    Attitude,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl PidGains {
    pub const fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self { kp, ki, kd }
    }
}

/// Any configuration frame. Data longer than 62 bytes is truncated.
pub fn config_frame(cmd: ConfigCmd, data: &[u8]) -> Vec<u8> {
    let data = &data[..data.len().min(MAX_CONFIG_DATA)];
    let mut out = Vec::with_capacity(data.len() + 3);
    out.push(CONFIG_LEAD);
    out.push(cmd.code());
    out.extend_from_slice(data);
    out.push(checksum(&out));
    out
}

/// `axis:u8 | kp:f32 | ki:f32 | kd:f32 | is_rate:u8`
pub fn pid_set_frame(axis: PidAxis, kind: LoopKind, gains: PidGains) -> Vec<u8> {
    let mut data = Vec::with_capacity(PID_DATA_LEN);
    data.put_u8(axis.index());
    data.put_f32_le(gains.kp);
    data.put_f32_le(gains.ki);
    data.put_f32_le(gains.kd);
    data.put_u8(matches!(kind, LoopKind::Rate) as u8);
    config_frame(ConfigCmd::PidParams, &data)
}

/// The device answers with console text, not a structured frame.
pub fn pid_query_frame() -> Vec<u8> {
    config_frame(ConfigCmd::PidQuery, &[])
}

/// Diagnostic text, cut at 62 bytes (may split a multi-byte char).
pub fn test_frame(message: &str) -> Vec<u8> {
    config_frame(ConfigCmd::Test, message.as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFrame {
    pub cmd: ConfigCmd,
    pub data: Vec<u8>,
}

impl ConfigFrame {
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() < 3 {
            return Err(ProtoError::TooShort(bytes.len()));
        }
        if bytes[0] != CONFIG_LEAD {
            return Err(ProtoError::NotConfigFrame(bytes[0]));
        }
        let (body, tail) = bytes.split_at(bytes.len() - 1);
        let expected = checksum(body);
        if expected != tail[0] {
            return Err(ProtoError::Checksum { expected, actual: tail[0] });
        }
        if body.len() - 2 > MAX_CONFIG_DATA {
            return Err(ProtoError::PayloadTooLong { len: body.len() - 2, max: MAX_CONFIG_DATA });
        }
        Ok(Self { cmd: ConfigCmd::from_code(body[1]), data: body[2..].to_vec() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;

    #[test]
    fn pid_set_frame_layout() {
        let frame = pid_set_frame(PidAxis::Roll, LoopKind::Rate, PidGains::new(250.0, 500.0, 2.5));
        assert_eq!(frame.len(), 17);
        assert_eq!(&frame[..2], &[0xAA, 0x04]);
        assert_eq!(frame[16], checksum(&frame[..16]));

        let mut data = &frame[2..16];
        assert_eq!(data.get_u8(), 0);
        assert_eq!(data.get_f32_le(), 250.0);
        assert_eq!(data.get_f32_le(), 500.0);
        assert_eq!(data.get_f32_le(), 2.5);
        assert_eq!(data.get_u8(), 1);
    }

    #[test]
    fn attitude_loop_flag_is_zero() {
        let frame = pid_set_frame(PidAxis::Yaw, LoopKind::Attitude, PidGains::new(6.0, 1.0, 0.35));
        assert_eq!(frame[2], 2);
        assert_eq!(frame[15], 0);
    }

    #[test]
    fn pid_query_is_header_only() {
        assert_eq!(pid_query_frame(), vec![0xAA, 0x84, 0x2E]);
    }

    #[test]
    fn test_frame_truncates_to_62_bytes() {
        let long = "x".repeat(100);
        let frame = test_frame(&long);
        assert_eq!(frame.len(), 2 + 62 + 1);
        let parsed = ConfigFrame::parse(&frame).unwrap();
        assert_eq!(parsed.cmd, ConfigCmd::Test);
        assert_eq!(parsed.data.len(), 62);
    }

    #[test]
    fn parse_rejects_bad_frames() {
        assert_eq!(ConfigFrame::parse(&[0xAA, 0x01]), Err(ProtoError::TooShort(2)));
        assert_eq!(ConfigFrame::parse(&[0x30, 0x01, 0x31]), Err(ProtoError::NotConfigFrame(0x30)));
        let mut frame = test_frame("hi");
        *frame.last_mut().unwrap() ^= 0x01;
        assert!(matches!(ConfigFrame::parse(&frame), Err(ProtoError::Checksum { .. })));
    }

    #[test]
    fn reserved_kinds_keep_their_codes() {
        let frame = config_frame(ConfigCmd::DeviceName, b"esp-fly");
        let parsed = ConfigFrame::parse(&frame).unwrap();
        assert_eq!(parsed.cmd, ConfigCmd::DeviceName);
        assert_eq!(parsed.data, b"esp-fly");
        assert_eq!(ConfigCmd::from_code(0x42), ConfigCmd::Other(0x42));
    }
}
