use fly_proto::commander::{MAX_ANGLE_DEG, THRUST_MAX};

/// Normalised stick deflection as reported by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StickPosition {
    pub x: f32,
    pub y: f32,
}

impl StickPosition {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Right stick: x -> roll, y -> pitch, both scaled to +-30 deg.
pub fn stick_to_attitude(stick: StickPosition) -> (f32, f32) {
    (axis(stick.x) * MAX_ANGLE_DEG, axis(stick.y) * MAX_ANGLE_DEG)
}

/// Left stick throttle in [0, 1] -> 0..=60000, truncated. Below centre reads as zero.
pub fn throttle_to_thrust(throttle: f32) -> u16 {
    if throttle.is_nan() || throttle <= 0.0 {
        return 0;
    }
    (throttle.min(1.0) * f32::from(THRUST_MAX)) as u16
}

fn axis(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) }
}
