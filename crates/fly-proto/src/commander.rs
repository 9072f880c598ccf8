//! Flight setpoint frames on the commander port.
//!
//! Payload (14 bytes, little-endian): `roll:f32 | -pitch:f32 | yaw_rate:f32 | thrust:u16`.
//! Pitch goes out negated: stick-forward is negative on the device side.

use bytes::BufMut;

use crate::crtp::{self, CrtpPort};

pub const MAX_ANGLE_DEG: f32 = 30.0;
pub const MAX_YAW_RATE_DEG_S: f32 = 180.0;
pub const THRUST_MAX: u16 = 60_000;
pub const THRUST_HOVER: u16 = 35_000;

pub const COMMANDER_CHANNEL: u8 = 0;
pub const SETPOINT_LEN: usize = 14;

/// Latest commanded attitude and thrust.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommandFrame {
    pub roll_deg: f32,
    pub pitch_deg: f32,
    pub yaw_rate_deg_s: f32,
    pub thrust: u16,
}

impl CommandFrame {
    pub fn stop() -> Self {
        Self::default()
    }

    pub fn hover(thrust: u16) -> Self {
        Self { thrust, ..Self::default() }
    }

    /// Saturates every field to its legal range. NaN angles collapse to zero.
    pub fn clamped(self) -> Self {
        Self {
            roll_deg: clamp_finite(self.roll_deg, MAX_ANGLE_DEG),
            pitch_deg: clamp_finite(self.pitch_deg, MAX_ANGLE_DEG),
            yaw_rate_deg_s: clamp_finite(self.yaw_rate_deg_s, MAX_YAW_RATE_DEG_S),
            thrust: self.thrust.min(THRUST_MAX),
        }
    }

    pub fn payload(&self) -> [u8; SETPOINT_LEN] {
        let c = self.clamped();
        let mut buf = Vec::with_capacity(SETPOINT_LEN);
        buf.put_f32_le(c.roll_deg);
        // no -0.0 on the wire
        buf.put_f32_le(if c.pitch_deg == 0.0 { 0.0 } else { -c.pitch_deg });
        buf.put_f32_le(c.yaw_rate_deg_s);
        buf.put_u16_le(c.thrust);

        let mut out = [0u8; SETPOINT_LEN];
        out.copy_from_slice(&buf);
        out
    }

    /// Full CRTP frame ready for the link.
    pub fn to_packet(&self) -> Vec<u8> {
        let payload = self.payload();
        // Commander port/channel and a 14-byte payload are always in range.
        crtp::encode(CrtpPort::Commander.nibble(), COMMANDER_CHANNEL, &payload)
            .unwrap_or_default()
    }
}

fn clamp_finite(v: f32, limit: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(-limit, limit)
    }
}

/// Builds a setpoint frame from raw values; thrust wider than `u16` saturates.
pub fn command_packet(roll_deg: f32, pitch_deg: f32, yaw_rate_deg_s: f32, thrust: u32) -> Vec<u8> {
    CommandFrame {
        roll_deg,
        pitch_deg,
        yaw_rate_deg_s,
        thrust: thrust.min(u32::from(THRUST_MAX)) as u16,
    }
    .to_packet()
}

pub fn stop_packet() -> Vec<u8> {
    CommandFrame::stop().to_packet()
}

pub fn hover_packet(thrust: Option<u16>) -> Vec<u8> {
    CommandFrame::hover(thrust.unwrap_or(THRUST_HOVER)).to_packet()
}

/// Reads a setpoint payload back into wire values (pitch still negated).
pub fn parse_setpoint(payload: &[u8]) -> Option<(f32, f32, f32, u16)> {
    use bytes::Buf;

    if payload.len() < SETPOINT_LEN {
        return None;
    }
    let mut b = payload;
    Some((b.get_f32_le(), b.get_f32_le(), b.get_f32_le(), b.get_u16_le()))
}
