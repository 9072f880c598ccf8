pub mod doctor;
mod error;
mod events;
mod queue;
mod session;

pub use error::LinkError;
pub use events::{ConnectionState, ConsoleLog, CONSOLE_HISTORY};
pub use queue::OutboundQueue;
pub use session::UdpLink;

use serde::Deserialize;

pub const DEFAULT_REMOTE_HOST: &str = "192.168.43.42";
pub const DEFAULT_REMOTE_PORT: u16 = 2390;
pub const DEFAULT_LOCAL_PORT: u16 = 2399;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Flight controller address on the access-point network.
    pub remote_host: String,
    pub remote_port: u16,

    /// Local UDP port the device replies to. 0 lets the OS choose.
    pub local_port: u16,

    /// Receive poll timeout; bounds how long the receive loop waits between liveness checks.
    pub recv_timeout_ms: u64,

    /// Outbound queue depth. When full the oldest packet is dropped.
    pub queue_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            remote_host: DEFAULT_REMOTE_HOST.into(),
            remote_port: DEFAULT_REMOTE_PORT,
            local_port: DEFAULT_LOCAL_PORT,
            recv_timeout_ms: 1000,
            queue_capacity: 256,
        }
    }
}

impl LinkConfig {
    pub fn remote(&self) -> String {
        format!("{}:{}", self.remote_host, self.remote_port)
    }
}
