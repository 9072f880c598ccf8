use anyhow::Result;

use crate::LinkConfig;

pub fn check_link(cfg: &LinkConfig) -> Result<()> {
    anyhow::ensure!(!cfg.remote_host.trim().is_empty(), "link.remote_host missing");
    anyhow::ensure!(cfg.remote_port != 0, "link.remote_port must be non-zero");
    anyhow::ensure!(cfg.recv_timeout_ms >= 10 && cfg.recv_timeout_ms <= 10_000, "link.recv_timeout_ms should be 10..10000");
    anyhow::ensure!(cfg.queue_capacity >= 8, "link.queue_capacity too small; set >= 8");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass() {
        check_link(&LinkConfig::default()).unwrap();
    }

    #[test]
    fn local_port_zero_is_allowed_remote_port_zero_is_not() {
        let ephemeral = LinkConfig { local_port: 0, ..LinkConfig::default() };
        check_link(&ephemeral).unwrap();

        let no_remote = LinkConfig { remote_port: 0, ..LinkConfig::default() };
        assert!(check_link(&no_remote).is_err());
    }

    #[test]
    fn tiny_queue_fails() {
        let cfg = LinkConfig { queue_capacity: 2, ..LinkConfig::default() };
        assert!(check_link(&cfg).is_err());
    }
}
