use bytes::Buf;
use serde::Serialize;

use crate::crtp::{CrtpPacket, CrtpPort};
use crate::ProtoError;

pub const BATTERY_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatteryState {
    Normal,
    Charging,
    Charged,
    Low,
    Shutdown,
    Unknown(u8),
}

impl From<u8> for BatteryState {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Normal,
            1 => Self::Charging,
            2 => Self::Charged,
            3 => Self::Low,
            4 => Self::Shutdown,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatteryInfo {
    pub voltage_v: f32,
    pub voltage_mv: u16,
    pub level_pct: u8,
    pub state: BatteryState,
}

impl BatteryInfo {
    /// `voltage:f32 | voltage_mv:u16 | level:u8 | state:u8`, little-endian. Extra bytes are ignored.
    pub fn parse(payload: &[u8]) -> Result<Self, ProtoError> {
        if payload.len() < BATTERY_LEN {
            return Err(ProtoError::ShortPayload { what: "battery", len: payload.len(), need: BATTERY_LEN });
        }
        let mut b = payload;
        Ok(Self {
            voltage_v: b.get_f32_le(),
            voltage_mv: b.get_u16_le(),
            level_pct: b.get_u8(),
            state: BatteryState::from(b.get_u8()),
        })
    }
}

/// UTF-8 (lossy) with NUL padding stripped from both ends.
pub fn parse_console(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).trim_matches('\0').to_string()
}

/// What an inbound packet means to the link layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    Battery(BatteryInfo),
    Console(String),
    /// Recognised port we do not forward, or a payload too short/empty to use.
    Ignored(CrtpPort),
}

impl Telemetry {
    pub fn classify(pkt: &CrtpPacket) -> Self {
        let port = pkt.crtp_port();
        match port {
            CrtpPort::Platform => match BatteryInfo::parse(&pkt.payload) {
                Ok(info) => Self::Battery(info),
                Err(_) => Self::Ignored(port),
            },
            CrtpPort::Console => {
                let line = parse_console(&pkt.payload);
                if line.is_empty() {
                    Self::Ignored(port)
                } else {
                    Self::Console(line)
                }
            }
            CrtpPort::Param
            | CrtpPort::Commander
            | CrtpPort::Mem
            | CrtpPort::Log
            | CrtpPort::Localization
            | CrtpPort::SetpointGeneric
            | CrtpPort::SetpointHl
            | CrtpPort::Link
            | CrtpPort::Reserved(_) => Self::Ignored(port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn battery_payload(v: f32, mv: u16, level: u8, state: u8) -> Vec<u8> {
        let mut p = Vec::new();
        p.put_f32_le(v);
        p.put_u16_le(mv);
        p.put_u8(level);
        p.put_u8(state);
        p
    }

    #[test]
    fn parses_battery_payload() {
        let info = BatteryInfo::parse(&battery_payload(3.85, 3850, 72, 0)).unwrap();
        assert_eq!(
            info,
            BatteryInfo { voltage_v: 3.85, voltage_mv: 3850, level_pct: 72, state: BatteryState::Normal }
        );
    }

    #[test]
    fn short_battery_payload_is_an_error() {
        let err = BatteryInfo::parse(&[0u8; 7]).unwrap_err();
        assert_eq!(err, ProtoError::ShortPayload { what: "battery", len: 7, need: 8 });
    }

    #[test]
    fn unknown_battery_state_is_kept() {
        let info = BatteryInfo::parse(&battery_payload(3.3, 3300, 5, 9)).unwrap();
        assert_eq!(info.state, BatteryState::Unknown(9));
        assert_eq!(BatteryState::from(3), BatteryState::Low);
    }

    #[test]
    fn console_strips_nul_padding() {
        assert_eq!(parse_console(b"PID SET: Rate Roll\0\0\0"), "PID SET: Rate Roll");
        assert_eq!(parse_console(b"\0\0"), "");
    }

    #[test]
    fn classify_routes_by_port() {
        let bat = CrtpPacket::new(0xD, 0, &battery_payload(4.1, 4100, 95, 2)).unwrap();
        assert!(matches!(Telemetry::classify(&bat), Telemetry::Battery(b) if b.level_pct == 95));

        let con = CrtpPacket::new(0x0, 0, b"hello\0").unwrap();
        assert_eq!(Telemetry::classify(&con), Telemetry::Console("hello".into()));

        let empty = CrtpPacket::new(0x0, 0, b"\0").unwrap();
        assert_eq!(Telemetry::classify(&empty), Telemetry::Ignored(CrtpPort::Console));

        let log = CrtpPacket::new(0x5, 1, &[1, 2]).unwrap();
        assert_eq!(Telemetry::classify(&log), Telemetry::Ignored(CrtpPort::Log));
    }
}
