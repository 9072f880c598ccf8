use std::time::Duration;

use fly_link::UdpLink;
use fly_proto::config::{pid_query_frame, pid_set_frame, LoopKind, PidAxis, PidGains};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Gains for both control stages on all three axes.
/// Defaults match the flight controller firmware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidSettings {
    pub rate_roll: PidGains,
    pub rate_pitch: PidGains,
    pub rate_yaw: PidGains,
    pub attitude_roll: PidGains,
    pub attitude_pitch: PidGains,
    pub attitude_yaw: PidGains,
}

impl Default for PidSettings {
    fn default() -> Self {
        Self {
            rate_roll: PidGains::new(250.0, 500.0, 2.5),
            rate_pitch: PidGains::new(250.0, 500.0, 2.5),
            rate_yaw: PidGains::new(120.0, 16.7, 0.0),
            attitude_roll: PidGains::new(5.9, 2.9, 0.0),
            attitude_pitch: PidGains::new(5.9, 2.9, 0.0),
            attitude_yaw: PidGains::new(6.0, 1.0, 0.35),
        }
    }
}

impl PidSettings {
    pub fn get(&self, kind: LoopKind, axis: PidAxis) -> PidGains {
        match (kind, axis) {
            (LoopKind::Rate, PidAxis::Roll) => self.rate_roll,
            (LoopKind::Rate, PidAxis::Pitch) => self.rate_pitch,
            (LoopKind::Rate, PidAxis::Yaw) => self.rate_yaw,
            (LoopKind::Attitude, PidAxis::Roll) => self.attitude_roll,
            (LoopKind::Attitude, PidAxis::Pitch) => self.attitude_pitch,
            (LoopKind::Attitude, PidAxis::Yaw) => self.attitude_yaw,
        }
    }

    pub fn set(&mut self, kind: LoopKind, axis: PidAxis, gains: PidGains) {
        let slot = match (kind, axis) {
            (LoopKind::Rate, PidAxis::Roll) => &mut self.rate_roll,
            (LoopKind::Rate, PidAxis::Pitch) => &mut self.rate_pitch,
            (LoopKind::Rate, PidAxis::Yaw) => &mut self.rate_yaw,
            (LoopKind::Attitude, PidAxis::Roll) => &mut self.attitude_roll,
            (LoopKind::Attitude, PidAxis::Pitch) => &mut self.attitude_pitch,
            (LoopKind::Attitude, PidAxis::Yaw) => &mut self.attitude_yaw,
        };
        *slot = gains;
    }

    /// Rate loop first (roll, pitch, yaw), then attitude loop in the same axis order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        [LoopKind::Rate, LoopKind::Attitude]
            .into_iter()
            .flat_map(|kind| PidAxis::ALL.into_iter().map(move |axis| (kind, axis)))
            .map(|(kind, axis)| pid_set_frame(axis, kind, self.get(kind, axis)))
            .collect()
    }
}

pub fn push_one(link: &UdpLink, axis: PidAxis, kind: LoopKind, gains: PidGains) -> bool {
    let ok = link.send(pid_set_frame(axis, kind, gains));
    if ok {
        info!("pid: sent {:?} {:?} kp={} ki={} kd={}", kind, axis, gains.kp, gains.ki, gains.kd);
    } else {
        warn!("pid: link down, {:?} {:?} not sent", kind, axis);
    }
    ok
}

/// Queues all six frames, `gap` apart. Returns how many the link accepted.
pub async fn push_all(link: &UdpLink, settings: &PidSettings, gap: Duration) -> usize {
    let frames = settings.frames();
    let total = frames.len();
    let mut accepted = 0;
    for (i, frame) in frames.into_iter().enumerate() {
        if link.send(frame) {
            accepted += 1;
        }
        if i + 1 < total {
            tokio::time::sleep(gap).await;
        }
    }
    info!("pid: pushed {}/{} gain sets", accepted, total);
    accepted
}

/// The device answers on the console port with one text line per loop/axis.
pub fn query(link: &UdpLink) -> bool {
    link.send(pid_query_frame())
}
