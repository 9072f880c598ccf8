use anyhow::Result;
use fly_proto::commander::THRUST_MAX;
use fly_proto::config::{LoopKind, PidAxis};

use crate::{ControlConfig, PidSettings};

pub fn check_control(cfg: &ControlConfig) -> Result<()> {
    anyhow::ensure!(cfg.period_ms >= 5 && cfg.period_ms <= 100, "control.period_ms should be 5..100");
    anyhow::ensure!(cfg.hover_thrust <= THRUST_MAX, "control.hover_thrust above {}", THRUST_MAX);
    anyhow::ensure!(cfg.stop_burst >= 1, "control.stop_burst must be >= 1");
    anyhow::ensure!(cfg.stop_burst_gap_ms <= 100, "control.stop_burst_gap_ms too large");
    Ok(())
}

pub fn check_pid(pid: &PidSettings) -> Result<()> {
    for kind in [LoopKind::Rate, LoopKind::Attitude] {
        for axis in PidAxis::ALL {
            let g = pid.get(kind, axis);
            for (name, v) in [("kp", g.kp), ("ki", g.ki), ("kd", g.kd)] {
                anyhow::ensure!(v.is_finite() && v >= 0.0, "pid {:?} {:?} {} invalid: {}", kind, axis, name, v);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fly_proto::config::PidGains;

    #[test]
    fn defaults_pass() {
        check_control(&ControlConfig::default()).unwrap();
        check_pid(&PidSettings::default()).unwrap();
    }

    #[test]
    fn rejects_bad_values() {
        let cfg = ControlConfig { period_ms: 500, ..ControlConfig::default() };
        assert!(check_control(&cfg).is_err());

        let mut pid = PidSettings::default();
        pid.set(LoopKind::Rate, PidAxis::Yaw, PidGains::new(f32::NAN, 0.0, 0.0));
        assert!(check_pid(&pid).is_err());
    }
}
