pub mod dispatcher;
pub mod doctor;
pub mod joystick;
pub mod pid;

pub use dispatcher::ControlDispatcher;
pub use joystick::StickPosition;
pub use pid::PidSettings;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Setpoint cadence. The device failsafe trips if this stream stops.
    pub period_ms: u64,

    pub hover_thrust: u16,

    /// Emergency stop: number of back-to-back stop frames and the gap between them.
    pub stop_burst: u32,
    pub stop_burst_gap_ms: u64,

    /// Spacing between PID frames when pushing a full set.
    pub pid_push_gap_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            period_ms: 20,
            hover_thrust: fly_proto::commander::THRUST_HOVER,
            stop_burst: 3,
            stop_burst_gap_ms: 10,
            pid_push_gap_ms: 50,
        }
    }
}
